use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::watch;
use tripwire_common::types::MetricSample;

use tripwire_server::app::App;
use tripwire_server::config::ServerConfig;
use tripwire_server::logging;
use tripwire_server::seed;
use tripwire_server::service::AlertingService;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  tripwire-server [config.toml]                     Start the evaluator; metrics are read as JSON lines from stdin");
    eprintln!("  tripwire-server seed <config.toml> <seed.json>    Load rules, channels, suppressions and escalation policies");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("seed") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("seed requires <config.toml> and <seed.json> arguments")
            })?;
            let seed_path = args.get(3).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("seed requires <seed.json> argument")
            })?;
            run_seed(config_path, seed_path).await
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or("config/tripwire.toml");
            run_server(config_path).await
        }
    }
}

async fn run_seed(config_path: &str, seed_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    logging::init_tracing(&config.log)?;

    let seed_file = seed::load_seed(seed_path)?;
    let app = App::build(&config).await?;
    let report = seed::apply_seed(&app.service, &seed_file).await?;
    tracing::info!(
        rules_created = report.rules_created,
        rules_skipped = report.rules_skipped,
        channels_created = report.channels_created,
        channels_skipped = report.channels_skipped,
        suppressions_created = report.suppressions_created,
        policies_created = report.policies_created,
        policies_skipped = report.policies_skipped,
        "Seed complete"
    );
    Ok(())
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    logging::init_tracing(&config.log)?;

    tracing::info!(
        db = %config.database.redacted_url(),
        interval_secs = config.evaluation.interval_secs,
        batch_size = config.evaluation.batch_size,
        critical_metrics = config.evaluation.critical_metrics.len(),
        "tripwire-server starting"
    );

    let app = App::build(&config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = app.scheduler;
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(shutdown_rx).await;
    });

    let stdin_handle = tokio::spawn(read_metrics(app.service.clone()));

    signal::ctrl_c().await?;
    tracing::info!("Shutting down gracefully");

    let _ = shutdown_tx.send(true);
    stdin_handle.abort();
    if let Err(e) = scheduler_handle.await {
        tracing::error!(error = %e, "Scheduler task failed");
    }
    tracing::info!("Server stopped");
    Ok(())
}

/// Reads newline-delimited [`MetricSample`] JSON from stdin until EOF.
async fn read_metrics(service: AlertingService) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let sample: MetricSample = match serde_json::from_str(line) {
                    Ok(sample) => sample,
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping malformed metric line");
                        continue;
                    }
                };
                if let Err(e) = service.ingest_metric(sample).await {
                    tracing::error!(error = %e, "Metric ingest failed");
                }
            }
            Ok(None) => {
                tracing::info!("Metric input closed");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to read metric input");
                break;
            }
        }
    }
}
