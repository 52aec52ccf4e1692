use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use futures_sniper::config::AppConfig;
use futures_sniper::engine::Engine;
use futures_sniper::market::bybit::BybitClient;
use futures_sniper::market::scanner::CancelToken;
use futures_sniper::monitoring::health::spawn_metrics_server;
use futures_sniper::monitoring::logger;
use futures_sniper::monitoring::metrics::PerformanceMonitor;

#[derive(Debug, Parser)]
#[command(name = "futures-sniper", about = "Parallel futures market scanner")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config/default.toml")]
    config: PathBuf,

    /// Run a single scan cycle and exit.
    #[arg(long)]
    once: bool,

    /// Override the configured alert threshold.
    #[arg(long)]
    threshold: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(&cli.config)?;
    if let Some(threshold) = cli.threshold {
        config.engine.alert_threshold = threshold;
    }

    logger::init_logging(&config.monitoring)?;

    tracing::info!(
        scan_interval_s = config.engine.scan_interval_seconds,
        concurrency = config.scanner.concurrency,
        alert_threshold = config.engine.alert_threshold,
        once = cli.once,
        "Futures sniper starting"
    );

    let client = Arc::new(BybitClient::new(&config.exchange)?);
    let monitor = Arc::new(PerformanceMonitor::new(&config.monitoring));
    let metrics_handle = spawn_metrics_server(monitor.clone(), config.monitoring.metrics_port);

    let mut engine = Engine::new(client, &config, monitor);
    let cancel = CancelToken::new();

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            ctrl_c_cancel.cancel();
        }
    });

    let outcome = if cli.once {
        let universe = engine.load_universe().await;
        engine.run_once(universe, &cancel).await.map(|result| {
            println!(
                "Scanned {} symbols in {}ms ({} skipped)",
                result.records.len() + result.skipped.len(),
                result.duration_ms,
                result.skipped.len()
            );
            for entry in result.top(6) {
                println!(
                    "{:>10}  {:5.1}  {:5}  {}",
                    entry.symbol().as_str(),
                    entry.score,
                    entry.direction.to_string(),
                    entry.combo_tags.join(",")
                );
            }
        })
    } else {
        engine.run(cancel).await
    };

    metrics_handle.abort();
    outcome?;
    Ok(())
}
