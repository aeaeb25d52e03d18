//! Detects a browser download landing in a directory and moves it to a stable name.
//!
//! Browsers pick the final file name themselves (`stock(1).xlsx`,
//! `Stock Report.xlsx`, ...), so the watcher matches loosely and then renames
//! the hit to the canonical path the merge step reads from.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use regex::Regex;

use crate::config::{DownloadConfig, PipelinePaths};
use crate::error::{PipelineError, Result};

/// Suffixes browsers use for downloads that are still in flight.
const PARTIAL_SUFFIXES: [&str; 3] = [".crdownload", ".part", ".tmp"];

/// One wait for one download.
#[derive(Debug, Clone)]
pub struct DownloadWatch {
    directory: PathBuf,
    pattern: Regex,
    keyword: String,
    timeout: Duration,
    poll_interval: Duration,
    canonical_path: PathBuf,
    excluded: Vec<PathBuf>,
}

impl DownloadWatch {
    /// Watch `directory` for a file matching the glob `pattern` whose name
    /// contains `keyword`, renaming it to `canonical_name` in the same directory.
    pub fn new(
        directory: impl Into<PathBuf>,
        pattern: &str,
        keyword: impl Into<String>,
        timeout: Duration,
        canonical_name: &str,
    ) -> Result<Self> {
        let directory = directory.into();
        Ok(Self {
            canonical_path: directory.join(canonical_name),
            directory,
            pattern: glob_to_regex(pattern)?,
            keyword: keyword.into(),
            timeout,
            poll_interval: Duration::from_secs(1),
            excluded: Vec::new(),
        })
    }

    pub fn from_config(paths: &PipelinePaths, download: &DownloadConfig) -> Result<Self> {
        let canonical_name = paths
            .stock_file
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                PipelineError::InvalidConfig(format!(
                    "stock file {} has no usable file name",
                    paths.stock_file.display()
                ))
            })?;

        Ok(Self::new(
            paths.download_dir.clone(),
            &download.pattern,
            download.keyword.clone(),
            download.timeout,
            canonical_name,
        )?
        .with_poll_interval(download.poll_interval)
        .excluding(paths.output_file.clone())
        .excluding(paths.sales_file.clone()))
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Never treat `path` as a download, even if its name matches.
    pub fn excluding(mut self, path: impl Into<PathBuf>) -> Self {
        self.excluded.push(path.into());
        self
    }

    pub fn canonical_path(&self) -> &Path {
        &self.canonical_path
    }

    /// Poll until a matching file exists, then move it to the canonical path.
    ///
    /// A file already sitting at the canonical path matches too, so calling
    /// this again after a successful run returns immediately.
    pub async fn await_file(&self) -> Result<PathBuf> {
        let start = Instant::now();
        tracing::info!(
            dir = %self.directory.display(),
            keyword = %self.keyword,
            timeout_secs = self.timeout.as_secs(),
            "Waiting for download"
        );

        loop {
            if let Some(found) = self.find_match()? {
                return self.normalize(found);
            }

            if start.elapsed() >= self.timeout {
                return Err(PipelineError::DownloadTimeout {
                    keyword: self.keyword.clone(),
                    timeout: self.timeout,
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// First matching file in directory-listing order. Listing order is
    /// platform dependent, so with several candidates the pick is too.
    fn find_match(&self) -> Result<Option<PathBuf>> {
        let entries = std::fs::read_dir(&self.directory).map_err(|e| {
            PipelineError::io(
                format!("Failed to list download dir {}", self.directory.display()),
                e,
            )
        })?;

        let keyword = self.keyword.to_lowercase();
        for entry in entries.filter_map(|e| e.ok()) {
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_lowercase();
            if PARTIAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
                continue;
            }

            if !self.pattern.is_match(&name) || !name.contains(&keyword) {
                continue;
            }

            let path = entry.path();
            if !self.excluded.contains(&path) {
                return Ok(Some(path));
            }
        }

        Ok(None)
    }

    fn normalize(&self, found: PathBuf) -> Result<PathBuf> {
        if found == self.canonical_path {
            tracing::info!(path = %found.display(), "Download already at canonical path");
            return Ok(found);
        }

        move_replacing(&found, &self.canonical_path)?;
        tracing::info!(
            from = %found.display(),
            to = %self.canonical_path.display(),
            "Download detected and renamed"
        );
        Ok(self.canonical_path.clone())
    }
}

/// Rename `from` over `to`, copying when the rename crosses filesystems.
fn move_replacing(from: &Path, to: &Path) -> Result<()> {
    let rename_err = match std::fs::rename(from, to) {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };

    std::fs::copy(from, to)
        .and_then(|_| std::fs::remove_file(from))
        .map_err(|_| {
            PipelineError::io(
                format!("Failed to move {} to {}", from.display(), to.display()),
                rename_err,
            )
        })
}

/// Translate a `*`/`?` glob into an anchored, case-insensitive regex.
fn glob_to_regex(glob: &str) -> Result<Regex> {
    let mut pattern = String::from("(?i)^");
    for ch in glob.chars() {
        match ch {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');

    Regex::new(&pattern)
        .map_err(|e| PipelineError::InvalidConfig(format!("bad file pattern {glob:?}: {e}")))
}
