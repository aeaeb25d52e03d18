//! End-to-end run: log in, download the stock sheet, reconcile it, upload the result.
//!
//! Every step is awaited in order and any failure aborts the rest. The
//! browser session is terminated exactly once on every exit path.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::browser::DocumentSession;
use crate::config::{Readiness, ResolvedConfig};
use crate::dialog::{select_dialog_automation, NativeDialogAutomation, UploadMode};
use crate::error::Result;
use crate::merge;
use crate::watcher::DownloadWatch;

/// Progress of a run. Logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    LoggedIn,
    OnDocumentPage,
    DownloadTriggered,
    FileArrived,
    Reconciled,
    OnUploadPage,
    DialogOpened,
    PathTyped,
    ManualWait,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::LoggedIn => "logged_in",
            Stage::OnDocumentPage => "on_document_page",
            Stage::DownloadTriggered => "download_triggered",
            Stage::FileArrived => "file_arrived",
            Stage::Reconciled => "reconciled",
            Stage::OnUploadPage => "on_upload_page",
            Stage::DialogOpened => "dialog_opened",
            Stage::PathTyped => "path_typed",
            Stage::ManualWait => "manual_wait",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stock_path: PathBuf,
    pub output_path: PathBuf,
    /// Number of sales entries applied, not units sold.
    pub sales_rows: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropped_products: Vec<String>,
    /// `None` when uploading is disabled.
    pub upload: Option<UploadMode>,
}

pub struct Pipeline {
    config: ResolvedConfig,
    dialog: Box<dyn NativeDialogAutomation>,
}

impl Pipeline {
    /// Dialog automation is picked here, once, from the platform and config.
    pub fn new(config: ResolvedConfig) -> Self {
        let dialog = select_dialog_automation(&config.upload);
        Self { config, dialog }
    }

    pub fn with_dialog(config: ResolvedConfig, dialog: Box<dyn NativeDialogAutomation>) -> Self {
        Self { config, dialog }
    }

    /// Drive `session` through the whole run, then terminate it.
    ///
    /// If the run fails, that error is returned and a terminate failure is
    /// only logged. If the run succeeds, a terminate failure is returned.
    pub async fn run<S: DocumentSession>(&self, mut session: S) -> Result<RunReport> {
        let started_at = Utc::now();
        tracing::info!(dialog = self.dialog.name(), "Starting stock sync run");

        let mut stage = Stage::Start;
        let outcome = self.drive(&mut session, &mut stage).await;
        let terminated = session.terminate().await;

        match (outcome, terminated) {
            (Ok(partial), Ok(())) => Ok(RunReport {
                started_at,
                finished_at: Utc::now(),
                ..partial
            }),
            (Ok(_), Err(err)) => {
                tracing::error!(error = %err, "Run completed but browser teardown failed");
                Err(err)
            }
            (Err(err), teardown) => {
                if let Err(teardown_err) = teardown {
                    tracing::warn!(error = %teardown_err, "Browser teardown failed after run error");
                }
                tracing::error!(last_stage = %stage, error = %err, "Run failed");
                Err(err)
            }
        }
    }

    async fn drive<S: DocumentSession>(
        &self,
        session: &mut S,
        stage: &mut Stage,
    ) -> Result<RunReport> {
        let config = &self.config;
        let watch = DownloadWatch::from_config(&config.paths, &config.download)?;

        session.login().await?;
        advance(stage, Stage::LoggedIn);

        session.navigate_to(&config.document.url).await?;
        match &config.document.readiness {
            Readiness::FixedDelay { delay } => tokio::time::sleep(*delay).await,
            Readiness::Element { selector, timeout } => {
                session.wait_for_element(selector, *timeout).await?;
            }
        }
        advance(stage, Stage::OnDocumentPage);

        let menu_timeout = config.document.menu_timeout;
        let menu = session
            .wait_for_element(&config.document.file_menu_selector, menu_timeout)
            .await?;
        session.click(&menu).await?;
        let download = session
            .wait_for_element(&config.document.download_entry_selector, menu_timeout)
            .await?;
        session.click(&download).await?;
        advance(stage, Stage::DownloadTriggered);

        let stock_path = watch.await_file().await?;
        advance(stage, Stage::FileArrived);

        let summary = merge::reconcile(
            &stock_path,
            &config.paths.sales_file,
            &config.paths.output_file,
        )?;
        advance(stage, Stage::Reconciled);

        let mut report = RunReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            stock_path,
            output_path: summary.output_path,
            sales_rows: summary.sales_rows,
            dropped_products: summary.dropped_products,
            upload: None,
        };

        if !config.upload.enabled {
            tracing::info!("Upload disabled; stopping after reconciliation");
            advance(stage, Stage::Done);
            return Ok(report);
        }

        let upload = &config.upload;
        session.navigate_to(&upload.url).await?;
        advance(stage, Stage::OnUploadPage);

        let upload_button = session
            .wait_for_element(&upload.upload_button_selector, upload.button_timeout)
            .await?;
        session.click(&upload_button).await?;
        let file_button = session
            .wait_for_element(&upload.file_button_selector, upload.button_timeout)
            .await?;
        session.click(&file_button).await?;
        advance(stage, Stage::DialogOpened);

        let mode = self.dialog.type_and_confirm(&report.output_path).await?;
        match mode {
            UploadMode::Automated => {
                advance(stage, Stage::PathTyped);
                tokio::time::sleep(upload.post_upload_settle).await;
            }
            UploadMode::Manual => advance(stage, Stage::ManualWait),
        }
        report.upload = Some(mode);

        advance(stage, Stage::Done);
        Ok(report)
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    tracing::info!(from = %stage, stage = %next, "Stage complete");
    *stage = next;
}
