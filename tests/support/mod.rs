#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use stocksync::browser::DocumentSession;
use stocksync::config::{Readiness, ResolvedConfig};
use stocksync::dialog::{NativeDialogAutomation, UploadMode};
use stocksync::error::PipelineError;
use stocksync::merge::{Data, Sheet};

pub const DOWNLOADED_NAME: &str = "stock(1).xlsx";

fn sheet(path: &Path, header: &[&str], rows: Vec<Vec<Data>>) -> Sheet {
    Sheet {
        path: path.to_path_buf(),
        name: "Sheet1".to_string(),
        header: header.iter().map(|h| h.to_string()).collect(),
        rows,
    }
}

/// `product_id, stock_qty` sheet.
pub fn stock_sheet(rows: &[(&str, f64)]) -> Sheet {
    sheet(
        Path::new("stock.xlsx"),
        &["product_id", "stock_qty"],
        rows.iter()
            .map(|(id, qty)| vec![Data::String(id.to_string()), Data::Float(*qty)])
            .collect(),
    )
}

/// `product_id, quantity_sold` sheet.
pub fn sales_sheet(rows: &[(&str, f64)]) -> Sheet {
    sheet(
        Path::new("sales.xlsx"),
        &["product_id", "quantity_sold"],
        rows.iter()
            .map(|(id, qty)| vec![Data::String(id.to_string()), Data::Float(*qty)])
            .collect(),
    )
}

pub fn write_stock(path: &Path, rows: &[(&str, f64)]) -> Result<()> {
    stock_sheet(rows).write_atomic(path)?;
    Ok(())
}

pub fn write_sales(path: &Path, rows: &[(&str, f64)]) -> Result<()> {
    sales_sheet(rows).write_atomic(path)?;
    Ok(())
}

/// Quantity per product id in a reconciled sheet, in row order.
pub fn quantities(path: &Path) -> Result<Vec<(String, Option<f64>)>> {
    let sheet = Sheet::read(path)?;
    let id = sheet.column("product_id")?;
    let qty = sheet.column("stock_qty")?;
    Ok(sheet
        .rows
        .iter()
        .map(|row| {
            let value = match &row[qty] {
                Data::Float(v) => Some(*v),
                Data::Int(v) => Some(*v as f64),
                _ => None,
            };
            (row[id].to_string(), value)
        })
        .collect())
}

/// Config rooted at `dir` with every fixed delay removed.
pub fn fast_config(dir: &Path) -> ResolvedConfig {
    let mut config = ResolvedConfig::for_download_dir(dir);
    config.document.readiness = Readiness::FixedDelay {
        delay: Duration::ZERO,
    };
    config.download.timeout = Duration::from_millis(500);
    config.download.poll_interval = Duration::from_millis(20);
    config.upload.post_upload_settle = Duration::ZERO;
    config.upload.manual_wait = Duration::ZERO;
    config
}

/// Scripted browser session.
///
/// Calls are numbered from zero in the order they arrive. Clicking the
/// download entry drops a stock sheet into the download dir under a
/// browser-style name.
#[derive(Clone)]
pub struct MockSession {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub terminations: Arc<AtomicUsize>,
    download_dir: PathBuf,
    download_selector: String,
    download: Option<Vec<(String, f64)>>,
    fail_on_call: Option<usize>,
    fail_terminate: bool,
}

impl MockSession {
    pub fn new(config: &ResolvedConfig) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            terminations: Arc::new(AtomicUsize::new(0)),
            download_dir: config.paths.download_dir.clone(),
            download_selector: config.document.download_entry_selector.clone(),
            download: Some(vec![("P1".to_string(), 10.0), ("P2".to_string(), 4.0)]),
            fail_on_call: None,
            fail_terminate: false,
        }
    }

    pub fn failing_on_call(mut self, index: usize) -> Self {
        self.fail_on_call = Some(index);
        self
    }

    pub fn without_download(mut self) -> Self {
        self.download = None;
        self
    }

    pub fn failing_terminate(mut self) -> Self {
        self.fail_terminate = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn terminate_count(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) -> Result<(), PipelineError> {
        let mut calls = self
            .calls
            .lock()
            .map_err(|_| PipelineError::Browser("call log poisoned".to_string()))?;
        let index = calls.len();
        calls.push(call.clone());

        if self.fail_on_call == Some(index) {
            return Err(PipelineError::Browser(format!("injected failure at {call}")));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentSession for MockSession {
    type Element = String;

    async fn login(&mut self) -> Result<(), PipelineError> {
        self.record("login".to_string())
    }

    async fn navigate_to(&mut self, url: &str) -> Result<(), PipelineError> {
        self.record(format!("navigate {url}"))
    }

    async fn wait_for_element(
        &mut self,
        selector: &str,
        _max_wait: Duration,
    ) -> Result<String, PipelineError> {
        self.record(format!("wait {selector}"))?;
        Ok(selector.to_string())
    }

    async fn click(&mut self, element: &String) -> Result<(), PipelineError> {
        self.record(format!("click {element}"))?;

        if *element == self.download_selector {
            if let Some(rows) = &self.download {
                let rows: Vec<(&str, f64)> = rows.iter().map(|(id, q)| (id.as_str(), *q)).collect();
                stock_sheet(&rows).write_atomic(&self.download_dir.join(DOWNLOADED_NAME))?;
            }
        }
        Ok(())
    }

    async fn terminate(&mut self) -> Result<(), PipelineError> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        if self.fail_terminate {
            return Err(PipelineError::Browser("injected terminate failure".to_string()));
        }
        Ok(())
    }
}

/// Dialog automation that records the typed path instead of typing it.
#[derive(Clone, Default)]
pub struct RecordingDialog {
    pub typed: Arc<Mutex<Vec<PathBuf>>>,
    pub fail: bool,
}

#[async_trait]
impl NativeDialogAutomation for RecordingDialog {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn type_and_confirm(&self, path: &Path) -> Result<UploadMode, PipelineError> {
        if self.fail {
            return Err(PipelineError::Automation("injected dialog failure".to_string()));
        }
        if let Ok(mut typed) = self.typed.lock() {
            typed.push(path.to_path_buf());
        }
        Ok(UploadMode::Automated)
    }
}
