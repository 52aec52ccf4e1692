//! Structured JSON logging for the scan pipeline.
//!
//! `RUST_LOG` wins when set; otherwise the filter comes from
//! `monitoring.log_level`. Scan-cycle fields (symbol, score, rates) are
//! emitted as structured JSON fields, so the formatter keeps target and
//! line number and skips span context the pipeline never opens.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crate::config::MonitoringConfig;

fn configured_filter(config: &MonitoringConfig) -> EnvFilter {
    EnvFilter::new(&config.log_level)
}

fn env_filter(config: &MonitoringConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| configured_filter(config))
}

pub fn init_logging(config: &MonitoringConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .json()
        .with_target(true)
        .with_line_number(true)
        .with_current_span(false)
        .with_span_list(false)
        .init();

    Ok(())
}
