//! Filling in the operating system's file-open dialog.
//!
//! The dialog is not part of the page, so the browser session can't reach it.
//! On macOS the path is typed with synthesized keystrokes through
//! `osascript`; elsewhere a human has a short window to pick the file.

use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::{DialogMode, UploadConfig};
use crate::error::{PipelineError, Result};

/// Whether a run uploaded the file itself or handed the dialog to a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    Automated,
    Manual,
}

#[async_trait]
pub trait NativeDialogAutomation: Send + Sync {
    fn name(&self) -> &'static str;

    /// Enter `path` into the focused file dialog and confirm it.
    async fn type_and_confirm(&self, path: &Path) -> Result<UploadMode>;
}

/// Types the path with AppleScript `System Events` keystrokes.
#[derive(Debug, Clone)]
pub struct AppleScriptAutotyper {
    keystroke_delay: Duration,
    confirm_settle: Duration,
}

impl AppleScriptAutotyper {
    pub fn new(keystroke_delay: Duration, confirm_settle: Duration) -> Self {
        Self {
            keystroke_delay,
            confirm_settle,
        }
    }
}

#[async_trait]
impl NativeDialogAutomation for AppleScriptAutotyper {
    fn name(&self) -> &'static str {
        "applescript"
    }

    async fn type_and_confirm(&self, path: &Path) -> Result<UploadMode> {
        let path = path.to_str().ok_or_else(|| {
            PipelineError::Automation(format!("path is not valid UTF-8: {}", path.display()))
        })?;
        let script = keystroke_script(path, self.keystroke_delay, self.confirm_settle);

        tracing::info!(path, "Typing upload path into file dialog");
        let output = tokio::process::Command::new("osascript")
            .arg("-e")
            .arg(&script)
            .output()
            .await
            .map_err(|e| PipelineError::io("Failed to run osascript", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Automation(format!(
                "osascript exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(UploadMode::Automated)
    }
}

/// Gives a human `wait` to pick the file, then carries on.
#[derive(Debug, Clone)]
pub struct ManualHandoff {
    wait: Duration,
}

impl ManualHandoff {
    pub fn new(wait: Duration) -> Self {
        Self { wait }
    }
}

#[async_trait]
impl NativeDialogAutomation for ManualHandoff {
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn type_and_confirm(&self, path: &Path) -> Result<UploadMode> {
        tracing::warn!(
            path = %path.display(),
            wait_secs = self.wait.as_secs(),
            "Automatic file selection is unavailable; choose the file in the dialog by hand"
        );
        tokio::time::sleep(self.wait).await;
        Ok(UploadMode::Manual)
    }
}

pub fn native_dialog_supported() -> bool {
    cfg!(target_os = "macos")
}

/// Pick the dialog strategy for this platform and configuration.
pub fn select_dialog_automation(upload: &UploadConfig) -> Box<dyn NativeDialogAutomation> {
    match upload.dialog {
        DialogMode::Auto if native_dialog_supported() => Box::new(AppleScriptAutotyper::new(
            upload.keystroke_delay,
            upload.confirm_settle,
        )),
        _ => Box::new(ManualHandoff::new(upload.manual_wait)),
    }
}

/// AppleScript typing `path` one character at a time, then pressing Return
/// twice: once to accept the path, once to confirm the selection.
pub fn keystroke_script(path: &str, keystroke_delay: Duration, confirm_settle: Duration) -> String {
    let delay = keystroke_delay.as_secs_f64();
    let mut script = String::from("tell application \"System Events\"\n");

    for ch in path.chars() {
        let escaped = match ch {
            '"' => "\\\"".to_string(),
            '\\' => "\\\\".to_string(),
            other => other.to_string(),
        };
        let _ = writeln!(script, "    keystroke \"{escaped}\"");
        let _ = writeln!(script, "    delay {delay}");
    }

    script.push_str("    key code 36\n");
    let _ = writeln!(script, "    delay {}", confirm_settle.as_secs_f64());
    script.push_str("    key code 36\n");
    script.push_str("end tell");
    script
}
