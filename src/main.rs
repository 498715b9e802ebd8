use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use cost_anomaly_rs::logging::{init_logging, LogConfig};
use cost_anomaly_rs::store::ElasticsearchStore;
use cost_anomaly_rs::{AnomalyDetectionRunner, AppConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Detects billing cost anomalies once for each given account.
#[derive(Debug, Parser)]
#[command(name = "cost-anomaly", version)]
struct Cli {
    /// Configuration file (defaults to cost-anomaly.toml when present)
    #[arg(long, env = "COST_ANOMALY_CONFIG")]
    config: Option<PathBuf>,

    /// Account to run detection for, may be repeated
    #[arg(long = "account", required_unless_present = "print_config")]
    accounts: Vec<String>,

    /// Last day of the detection window (defaults to today, UTC)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Print a sample configuration file and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", AppConfig::sample_config()?);
        return Ok(());
    }

    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let _log_guard = init_logging(&LogConfig::from_logging_config(&config.logging))?;

    let store = Arc::new(ElasticsearchStore::new(&config.store)?);
    let runner = AnomalyDetectionRunner::new(store.clone(), store, config.detection.clone())
        .with_bulk_batch_size(config.store.bulk_batch_size);

    let token = CancellationToken::new();
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            ctrl_c_token.cancel();
        }
    });

    let today = cli.date.unwrap_or_else(|| chrono::Utc::now().date_naive());
    let mut failed = Vec::new();
    for account in &cli.accounts {
        if let Err(e) = runner.run_detection_at(account, today, &token).await {
            tracing::error!(account = %account, error = %e, "anomaly detection failed");
            failed.push(account.as_str());
        }
        if token.is_cancelled() {
            break;
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("anomaly detection failed for: {}", failed.join(", "));
    }
    Ok(())
}
