//! Errors raised by the pipeline components.
//!
//! Every variant is fatal to the current run. Components return these
//! unchanged and the orchestrator surfaces them after teardown.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::duration::format_duration;

/// Which reconciliation input a [`PipelineError::MissingInput`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Stock,
    Sales,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::Stock => f.write_str("stock file"),
            InputKind::Sales => f.write_str("sales file"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Login was not confirmed within {}: no {selector:?} element containing {marker:?}", human(.timeout))]
    LoginTimeout {
        selector: String,
        marker: String,
        timeout: Duration,
    },

    #[error("Element {selector:?} did not appear within {}", human(.timeout))]
    ElementNotFound { selector: String, timeout: Duration },

    #[error("No download containing {keyword:?} arrived within {}", human(.timeout))]
    DownloadTimeout { keyword: String, timeout: Duration },

    #[error("Missing {which}: {}", .path.display())]
    MissingInput { which: InputKind, path: PathBuf },

    #[error("{} has no {column:?} column", .path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("{} row {row}: {column:?} value {value:?} is not a number", .path.display())]
    InvalidCell {
        path: PathBuf,
        column: String,
        row: usize,
        value: String,
    },

    #[error("Failed to process spreadsheet {}: {reason}", .path.display())]
    Spreadsheet { path: PathBuf, reason: String },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Dialog automation failed: {0}")]
    Automation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn spreadsheet(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self::Spreadsheet {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

fn human(duration: &Duration) -> String {
    format_duration(*duration)
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
