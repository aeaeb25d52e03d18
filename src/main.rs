use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stocksync::browser::ChromiumSession;
use stocksync::config::{default_config_path, ResolvedConfig};
use stocksync::duration::parse_duration_arg;
use stocksync::merge;
use stocksync::pipeline::Pipeline;
use stocksync::watcher::DownloadWatch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "stocksync")]
#[command(about = "Download the stock sheet, subtract sales, upload the result")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Emit logs as JSON lines on stderr.
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full browser pipeline
    Run,

    /// Reconcile local spreadsheets without a browser
    Reconcile {
        /// Stock sheet (default: canonical stock file in the download dir)
        #[arg(long)]
        stock: Option<PathBuf>,

        /// Sales log
        #[arg(long)]
        sales: Option<PathBuf>,

        /// Where to write the reconciled sheet
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Wait for a stock download to land and normalize its name
    AwaitDownload {
        /// Override the configured download timeout (e.g. "30s", "2m").
        #[arg(long, value_name = "DURATION", value_parser = parse_duration_arg)]
        timeout: Option<Duration>,
    },

    /// Show current configuration
    Config,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,chromiumoxide=warn,chromiumoxide::conn=off,chromiumoxide::handler=off")
    });
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(layer).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = ResolvedConfig::load_or_default(&cli.config)?;

    match cli.command {
        Command::Run => {
            let session = ChromiumSession::launch(
                &config.browser,
                &config.login,
                &config.paths.download_dir,
            )
            .await
            .context("Failed to start browser session")?;

            let report = Pipeline::new(config).run(session).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Reconcile {
            stock,
            sales,
            output,
        } => {
            let stock = stock.unwrap_or_else(|| config.paths.stock_file.clone());
            let sales = sales.unwrap_or_else(|| config.paths.sales_file.clone());
            let output = output.unwrap_or_else(|| config.paths.output_file.clone());

            let summary = merge::reconcile(&stock, &sales, &output)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::AwaitDownload { timeout } => {
            let mut download = config.download.clone();
            if let Some(timeout) = timeout {
                download.timeout = timeout;
            }

            let path = DownloadWatch::from_config(&config.paths, &download)?
                .await_file()
                .await?;
            println!("{}", path.display());
        }
        Command::Config => {
            println!("# Config file: {}", cli.config.display());
            print!(
                "{}",
                toml::to_string_pretty(&config).context("Failed to render configuration")?
            );
        }
    }

    Ok(())
}
