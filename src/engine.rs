//! Long-running scan engine.
//!
//! Runs the scanner on a fixed interval, keeps only the latest result,
//! logs the top-ranked setups after each cycle and raises a target alert
//! when the best score clears the configured threshold.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::market::bybit::FALLBACK_UNIVERSE;
use crate::market::exchange::ExchangeClient;
use crate::market::models::{ScanResult, Symbol};
use crate::market::scanner::{CancelToken, ScanError, Scanner};
use crate::market::validator;
use crate::monitoring::alerts::AlertManager;
use crate::monitoring::metrics::PerformanceMonitor;

/// Ranked entries logged after every cycle.
const TOP_DISPLAY: usize = 6;

pub struct Engine {
    client: Arc<dyn ExchangeClient>,
    scanner: Scanner,
    alerts: AlertManager,
    scan_interval: Duration,
    latest: Option<ScanResult>,
}

impl Engine {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        config: &AppConfig,
        monitor: Arc<PerformanceMonitor>,
    ) -> Self {
        Self {
            scanner: Scanner::new(client.clone(), config, monitor),
            client,
            alerts: AlertManager::new(&config.engine),
            scan_interval: Duration::from_secs(config.engine.scan_interval_seconds),
            latest: None,
        }
    }

    /// Resolve the symbol universe from the exchange, keeping only
    /// well-formed USDT perpetual symbols; falls back to a static list of
    /// liquid perpetuals when the endpoint is unreachable or empty.
    pub async fn load_universe(&self) -> Vec<Symbol> {
        let loaded = match self.client.fetch_instruments().await {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!(error = %e, "Failed to load symbol universe, using fallback list");
                return fallback_universe();
            }
        };

        let total = loaded.len();
        let symbols = validator::validate_symbols(loaded);
        if symbols.is_empty() {
            warn!("Exchange returned no usable symbols, using fallback list");
            return fallback_universe();
        }
        if symbols.len() < total {
            warn!(
                dropped = total - symbols.len(),
                "Dropped malformed symbols from universe"
            );
        }

        info!(count = symbols.len(), "Loaded symbol universe from exchange");
        symbols
    }

    /// Run a single scan cycle and publish its result.
    pub async fn run_once(
        &mut self,
        universe: Vec<Symbol>,
        cancel: &CancelToken,
    ) -> Result<&ScanResult, ScanError> {
        let result = self.scanner.scan(universe, cancel).await?;
        self.report(&result);
        // Previous cycle's result is replaced wholesale, never merged.
        Ok(self.latest.insert(result))
    }

    /// Run scan cycles until cancelled. Only configuration errors abort
    /// the loop; cancellation is a clean shutdown.
    pub async fn run(&mut self, cancel: CancelToken) -> Result<(), ScanError> {
        let universe = self.load_universe().await;

        let mut interval = tokio::time::interval(self.scan_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if cancel.is_cancelled() {
                info!("Engine cancelled, shutting down");
                return Ok(());
            }

            match self.run_once(universe.clone(), &cancel).await {
                Ok(_) => {}
                Err(ScanError::Cancelled) => {
                    info!("Engine cancelled mid-scan, shutting down");
                    return Ok(());
                }
                Err(e) => {
                    error!(error = %e, "Scan aborted by configuration error");
                    return Err(e);
                }
            }
        }
    }

    pub fn latest(&self) -> Option<&ScanResult> {
        self.latest.as_ref()
    }

    fn report(&mut self, result: &ScanResult) {
        for (rank, entry) in result.top(TOP_DISPLAY).iter().enumerate() {
            info!(
                rank = rank + 1,
                symbol = %entry.symbol(),
                score = entry.score,
                direction = %entry.direction,
                combo_tags = ?entry.combo_tags,
                "Scan ranking"
            );
        }
        if !result.skipped.is_empty() {
            info!(skipped = result.skipped.len(), "Symbols skipped this cycle");
        }

        if let Some(best) = result.best() {
            self.alerts.maybe_alert(best);
        }
    }
}

fn fallback_universe() -> Vec<Symbol> {
    FALLBACK_UNIVERSE.iter().map(|s| Symbol::from(*s)).collect()
}
