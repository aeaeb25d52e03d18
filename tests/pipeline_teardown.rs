mod support;

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use stocksync::config::{Readiness, ResolvedConfig};
use stocksync::dialog::UploadMode;
use stocksync::error::{InputKind, PipelineError};
use stocksync::pipeline::Pipeline;
use support::{fast_config, quantities, write_sales, MockSession, RecordingDialog};
use tempfile::TempDir;

/// Browser calls in a complete run with uploading enabled.
const FULL_RUN_CALLS: usize = 11;

fn setup(dir: &Path) -> Result<ResolvedConfig> {
    let config = fast_config(dir);
    write_sales(&config.paths.sales_file, &[("P1", 3.0), ("P1", 2.0), ("P2", 9.0)])?;
    Ok(config)
}

fn pipeline(config: ResolvedConfig, dialog: &RecordingDialog) -> Pipeline {
    Pipeline::with_dialog(config, Box::new(dialog.clone()))
}

#[tokio::test]
async fn test_successful_run_terminates_once() -> Result<()> {
    let dir = TempDir::new()?;
    let config = setup(dir.path())?;
    let output = config.paths.output_file.clone();
    let session = MockSession::new(&config);
    let observer = session.clone();
    let dialog = RecordingDialog::default();

    let report = pipeline(config, &dialog).run(session).await?;

    assert_eq!(observer.terminate_count(), 1);
    assert_eq!(observer.calls().len(), FULL_RUN_CALLS);
    assert_eq!(observer.calls()[0], "login");
    assert_eq!(report.sales_rows, 3);
    assert_eq!(report.upload, Some(UploadMode::Automated));
    assert_eq!(report.output_path, output);
    assert!(report.finished_at >= report.started_at);
    assert_eq!(dialog.typed.lock().map(|t| t.clone()).unwrap_or_default(), vec![output.clone()]);

    assert_eq!(
        quantities(&output)?,
        vec![("P1".to_string(), Some(5.0)), ("P2".to_string(), Some(0.0))]
    );
    assert!(dir.path().join("stock.xlsx").exists());
    assert!(!dir.path().join(support::DOWNLOADED_NAME).exists());

    Ok(())
}

#[tokio::test]
async fn test_browser_failure_at_every_step_terminates_once() -> Result<()> {
    for failing_call in 0..FULL_RUN_CALLS {
        let dir = TempDir::new()?;
        let config = setup(dir.path())?;
        let session = MockSession::new(&config).failing_on_call(failing_call);
        let observer = session.clone();

        let result = pipeline(config, &RecordingDialog::default())
            .run(session)
            .await;

        assert!(
            matches!(result, Err(PipelineError::Browser(_))),
            "call {failing_call}: {result:?}"
        );
        assert_eq!(observer.terminate_count(), 1, "call {failing_call}");
        assert_eq!(observer.calls().len(), failing_call + 1, "call {failing_call}");
    }

    Ok(())
}

#[tokio::test]
async fn test_missing_download_terminates_once() -> Result<()> {
    let dir = TempDir::new()?;
    let config = setup(dir.path())?;
    let session = MockSession::new(&config).without_download();
    let observer = session.clone();

    let result = pipeline(config, &RecordingDialog::default())
        .run(session)
        .await;

    assert!(matches!(result, Err(PipelineError::DownloadTimeout { .. })));
    assert_eq!(observer.terminate_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_missing_sales_stops_before_upload() -> Result<()> {
    let dir = TempDir::new()?;
    let config = fast_config(dir.path());
    let session = MockSession::new(&config);
    let observer = session.clone();

    let result = pipeline(config, &RecordingDialog::default())
        .run(session)
        .await;

    assert!(matches!(
        result,
        Err(PipelineError::MissingInput {
            which: InputKind::Sales,
            ..
        })
    ));
    assert_eq!(observer.terminate_count(), 1);
    assert!(observer.calls().iter().all(|c| !c.starts_with("navigate https://docs.wps.com")));

    Ok(())
}

#[tokio::test]
async fn test_dialog_failure_terminates_once() -> Result<()> {
    let dir = TempDir::new()?;
    let config = setup(dir.path())?;
    let session = MockSession::new(&config);
    let observer = session.clone();
    let dialog = RecordingDialog {
        fail: true,
        ..Default::default()
    };

    let result = pipeline(config, &dialog).run(session).await;

    assert!(matches!(result, Err(PipelineError::Automation(_))));
    assert_eq!(observer.terminate_count(), 1);
    assert_eq!(observer.calls().len(), FULL_RUN_CALLS);

    Ok(())
}

#[tokio::test]
async fn test_run_error_wins_over_teardown_error() -> Result<()> {
    let dir = TempDir::new()?;
    let config = setup(dir.path())?;
    let session = MockSession::new(&config)
        .failing_on_call(0)
        .failing_terminate();
    let observer = session.clone();

    let result = pipeline(config, &RecordingDialog::default())
        .run(session)
        .await;

    match result {
        Err(PipelineError::Browser(msg)) => assert!(msg.contains("login"), "{msg}"),
        other => panic!("expected login failure, got {other:?}"),
    }
    assert_eq!(observer.terminate_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_teardown_error_fails_successful_run() -> Result<()> {
    let dir = TempDir::new()?;
    let config = setup(dir.path())?;
    let session = MockSession::new(&config).failing_terminate();
    let observer = session.clone();

    let result = pipeline(config, &RecordingDialog::default())
        .run(session)
        .await;

    match result {
        Err(PipelineError::Browser(msg)) => assert!(msg.contains("terminate"), "{msg}"),
        other => panic!("expected terminate failure, got {other:?}"),
    }
    assert_eq!(observer.terminate_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_upload_disabled_stops_after_reconcile() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = setup(dir.path())?;
    config.upload.enabled = false;
    let output = config.paths.output_file.clone();
    let session = MockSession::new(&config);
    let observer = session.clone();
    let dialog = RecordingDialog::default();

    let report = pipeline(config, &dialog).run(session).await?;

    assert_eq!(report.upload, None);
    assert_eq!(observer.calls().len(), 6);
    assert_eq!(observer.terminate_count(), 1);
    assert!(output.exists());
    assert!(dialog.typed.lock().map(|t| t.is_empty()).unwrap_or(false));

    Ok(())
}

const READY_SELECTOR: &str = "div.sheet-ready";

fn element_readiness(config: &mut ResolvedConfig) {
    config.document.readiness = Readiness::Element {
        selector: READY_SELECTOR.to_string(),
        timeout: Duration::from_secs(5),
    };
}

#[tokio::test]
async fn test_element_readiness_waits_for_selector() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = setup(dir.path())?;
    element_readiness(&mut config);
    let doc_url = config.document.url.clone();
    let session = MockSession::new(&config);
    let observer = session.clone();

    let report = pipeline(config, &RecordingDialog::default())
        .run(session)
        .await?;

    let calls = observer.calls();
    assert_eq!(calls.len(), FULL_RUN_CALLS + 1);
    assert_eq!(calls[1], format!("navigate {doc_url}"));
    assert_eq!(calls[2], format!("wait {READY_SELECTOR}"));
    assert_eq!(report.upload, Some(UploadMode::Automated));
    assert_eq!(observer.terminate_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_element_readiness_failure_terminates_once() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = setup(dir.path())?;
    element_readiness(&mut config);
    let session = MockSession::new(&config).failing_on_call(2);
    let observer = session.clone();

    let result = pipeline(config, &RecordingDialog::default())
        .run(session)
        .await;

    match result {
        Err(PipelineError::Browser(msg)) => assert!(msg.contains(READY_SELECTOR), "{msg}"),
        other => panic!("expected readiness failure, got {other:?}"),
    }
    assert_eq!(observer.calls().len(), 3);
    assert_eq!(observer.terminate_count(), 1);

    Ok(())
}
