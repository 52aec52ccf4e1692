//! Scan orchestration.
//!
//! One scan fans the symbol universe out across a bounded worker pool,
//! assembles per-symbol snapshots through the fetch stage, then runs the
//! whole batch through validation and scoring into a ranked result.
//! Individual symbol failures degrade to skip entries; the only
//! scan-level failures are bad configuration and cancellation.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::{AppConfig, ConfigError};
use crate::data::cache::AdaptiveCache;
use crate::data::limiter::AdaptiveRateLimiter;
use crate::market::exchange::ExchangeClient;
use crate::market::fetch::FetchStage;
use crate::market::models::{MarketRecord, ScanResult, SkippedSymbol, Symbol};
use crate::market::validator;
use crate::monitoring::metrics::{log_scan_summary, PerformanceMonitor, ScanStats};
use crate::scoring::ScoringEngine;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("scan cancelled")]
    Cancelled,
}

/// Cooperative cancellation flag shared between the engine and workers.
/// Workers stop pulling new symbols once it is set; a cancelled scan
/// discards all partial work.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::SeqCst)
    }
}

pub struct Scanner {
    fetch: Arc<FetchStage>,
    cache: Arc<AdaptiveCache>,
    limiter: Arc<AdaptiveRateLimiter>,
    scoring: ScoringEngine,
    monitor: Arc<PerformanceMonitor>,
    concurrency: usize,
    min_score: f64,
    max_symbols: usize,
}

impl Scanner {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        config: &AppConfig,
        monitor: Arc<PerformanceMonitor>,
    ) -> Self {
        let cache = Arc::new(AdaptiveCache::new(config.cache.clone()));
        let limiter = Arc::new(AdaptiveRateLimiter::new(&config.rate_limit));
        let fetch = Arc::new(FetchStage::new(
            client,
            cache.clone(),
            limiter.clone(),
            &config.exchange,
        ));

        Self {
            fetch,
            cache,
            limiter,
            scoring: ScoringEngine::new(config.scoring.high_volume_threshold),
            monitor,
            concurrency: config.scanner.concurrency,
            min_score: config.scanner.min_score,
            max_symbols: config.scanner.max_symbols,
        }
    }

    /// Run one full scan over the universe. Returns the ranked result, or
    /// fails for bad configuration or cancellation; everything else is
    /// per-symbol degradation recorded in `skipped`.
    pub async fn scan(
        &self,
        universe: Vec<Symbol>,
        cancel: &CancelToken,
    ) -> Result<ScanResult, ScanError> {
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency(self.concurrency).into());
        }
        if !(self.min_score >= 0.0) {
            return Err(ConfigError::InvalidMinScore(self.min_score).into());
        }

        let started_at = Utc::now();
        let start = Instant::now();

        let mut universe = universe;
        if universe.len() > self.max_symbols {
            universe.truncate(self.max_symbols);
        }
        let attempted = universe.len();

        let mut skipped = Vec::new();
        let mut symbols = Vec::with_capacity(universe.len());
        for symbol in universe {
            if validator::is_well_formed(symbol.as_str()) {
                symbols.push(symbol);
            } else {
                skipped.push(SkippedSymbol {
                    symbol,
                    reason: "malformed symbol".to_string(),
                });
            }
        }

        let (mut fetched, fetch_skipped) = self.fetch_all(symbols, cancel).await;
        if cancel.is_cancelled() {
            info!("scan cancelled, discarding partial results");
            return Err(ScanError::Cancelled);
        }
        skipped.extend(fetch_skipped);

        // Restore universe order before the batch stages.
        fetched.sort_by_key(|(idx, _)| *idx);
        let records: Vec<MarketRecord> = fetched.into_iter().map(|(_, r)| r).collect();

        let outcome = validator::validate_batch(records);
        if !outcome.rejected.is_empty() {
            info!(counts = ?outcome.rejection_counts(), "Records rejected by validator");
        }
        skipped.extend(outcome.rejected);

        let mut scored = self.scoring.score_batch(outcome.valid);
        // Health accounting sees every record that survived fetch and
        // validation; the min_score filter below is not a failure signal.
        let completed = scored.len();
        scored.retain(|r| r.score >= self.min_score);
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.symbol().cmp(b.symbol()))
        });

        let duration_ms = start.elapsed().as_millis() as u64;
        let stats = ScanStats {
            attempted,
            completed,
            skipped: skipped.len(),
            duration_ms,
            cache_hit_rate: self.cache.hit_rate(),
            api_success_rate: self.limiter.success_rate().await,
            limiter_delay_ms: self.limiter.current_delay().await.as_millis() as u64,
        };
        for alert in self.monitor.observe(stats.clone()) {
            warn!(alert = %alert, "Scan health degraded");
        }
        log_scan_summary(&stats);

        Ok(ScanResult {
            records: scored,
            skipped,
            started_at,
            duration_ms,
        })
    }

    /// Fan the symbol list out over the worker pool. Returns fetched
    /// records tagged with their universe index, plus skip entries.
    async fn fetch_all(
        &self,
        symbols: Vec<Symbol>,
        cancel: &CancelToken,
    ) -> (Vec<(usize, MarketRecord)>, Vec<SkippedSymbol>) {
        let symbols = Arc::new(symbols);
        let next = Arc::new(AtomicUsize::new(0));
        let workers = self.concurrency.min(symbols.len());

        let mut set = JoinSet::new();
        for _ in 0..workers {
            let fetch = self.fetch.clone();
            let symbols = symbols.clone();
            let next = next.clone();
            let cancel = cancel.clone();

            set.spawn(async move {
                let mut records = Vec::new();
                let mut skipped = Vec::new();

                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let idx = next.fetch_add(1, AtomicOrdering::SeqCst);
                    let Some(symbol) = symbols.get(idx) else {
                        break;
                    };

                    match fetch.fetch_record(symbol).await {
                        Ok(record) => records.push((idx, record)),
                        Err(err) => skipped.push(SkippedSymbol {
                            symbol: err.symbol.clone(),
                            reason: err.cause,
                        }),
                    }
                }

                (records, skipped)
            });
        }

        let mut all_records = Vec::new();
        let mut all_skipped = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((records, skipped)) => {
                    all_records.extend(records);
                    all_skipped.extend(skipped);
                }
                Err(err) => warn!(error = %err, "scan worker panicked"),
            }
        }

        (all_records, all_skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::exchange::{ExchangeError, Ticker};
    use crate::monitoring::metrics::HealthAlert;
    use async_trait::async_trait;
    use std::collections::HashSet;

    /// Deterministic exchange: per-symbol data tables, optional failures.
    struct ScriptedClient {
        failing: HashSet<String>,
    }

    impl ScriptedClient {
        fn new(failing: &[&str]) -> Self {
            Self {
                failing: failing.iter().map(|s| s.to_string()).collect(),
            }
        }

        fn check(&self, symbol: &Symbol) -> Result<(), ExchangeError> {
            if self.failing.contains(symbol.as_str()) {
                return Err(ExchangeError::Http("scripted failure".to_string()));
            }
            Ok(())
        }

        /// Stable per-symbol price variation.
        fn seed(symbol: &Symbol) -> u64 {
            symbol.as_str().bytes().map(u64::from).sum()
        }
    }

    #[async_trait]
    impl ExchangeClient for ScriptedClient {
        async fn fetch_instruments(&self) -> Result<Vec<Symbol>, ExchangeError> {
            Ok(Vec::new())
        }

        async fn fetch_ticker(&self, symbol: &Symbol) -> Result<Ticker, ExchangeError> {
            self.check(symbol)?;
            Ok(Ticker {
                price: 100.0 + (Self::seed(symbol) % 100) as f64,
                volume_24h: 20_000_000.0,
            })
        }

        async fn fetch_klines(&self, symbol: &Symbol) -> Result<Vec<f64>, ExchangeError> {
            self.check(symbol)?;
            // Falling closes: oversold RSI, bearish MACD.
            Ok((0..60).map(|i| 200.0 - i as f64).collect())
        }

        async fn fetch_funding_rate(&self, symbol: &Symbol) -> Result<f64, ExchangeError> {
            self.check(symbol)?;
            Ok(-0.0002)
        }

        async fn fetch_open_interest(&self, symbol: &Symbol) -> Result<Vec<f64>, ExchangeError> {
            self.check(symbol)?;
            Ok(vec![1000.0, 1100.0, 1200.0])
        }
    }

    fn test_config() -> AppConfig {
        let contents = include_str!("../../config/default.toml");
        let mut config: AppConfig = toml::from_str(contents).unwrap();
        config.exchange.max_retries = 0;
        config.rate_limit.min_delay_ms = 0;
        config.rate_limit.initial_delay_ms = 0;
        config
    }

    fn scanner_with(client: ScriptedClient, config: &AppConfig) -> Scanner {
        let monitor = Arc::new(PerformanceMonitor::new(&config.monitoring));
        Scanner::new(Arc::new(client), config, monitor)
    }

    fn universe(symbols: &[&str]) -> Vec<Symbol> {
        symbols.iter().map(|s| Symbol::from(*s)).collect()
    }

    #[tokio::test]
    async fn test_scan_ranks_by_score_then_symbol() {
        let config = test_config();
        let scanner = scanner_with(ScriptedClient::new(&[]), &config);

        let result = scanner
            .scan(universe(&["ETHUSDT", "BTCUSDT", "SOLUSDT"]), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(result.records.len(), 3);
        // Identical market data: equal scores, ranked by symbol.
        let symbols: Vec<&str> = result.records.iter().map(|r| r.symbol().as_str()).collect();
        assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT", "SOLUSDT"]);
        assert!(result.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_failed_symbols_become_skip_entries() {
        let config = test_config();
        let scanner = scanner_with(ScriptedClient::new(&["ETHUSDT"]), &config);

        let result = scanner
            .scan(universe(&["BTCUSDT", "ETHUSDT", "SOLUSDT"]), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(result.records.len(), 2);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].symbol.as_str(), "ETHUSDT");
        assert!(result.skipped[0].reason.contains("scripted failure"));
    }

    #[tokio::test]
    async fn test_malformed_symbols_are_skipped_up_front() {
        let config = test_config();
        let scanner = scanner_with(ScriptedClient::new(&[]), &config);

        let result = scanner
            .scan(universe(&["BTCUSDT", "ETHBTC"]), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].reason, "malformed symbol");
    }

    #[tokio::test]
    async fn test_min_score_filters_after_scoring() {
        let mut config = test_config();
        config.scanner.min_score = 100.0; // above any reachable score
        let scanner = scanner_with(ScriptedClient::new(&[]), &config);

        let result = scanner
            .scan(universe(&["BTCUSDT"]), &CancelToken::new())
            .await
            .unwrap();
        assert!(result.records.is_empty());
        assert!(result.skipped.is_empty(), "filtered is not skipped");
    }

    #[tokio::test]
    async fn test_min_score_filter_does_not_degrade_health_signal() {
        let mut config = test_config();
        config.scanner.min_score = 100.0;
        let monitor = Arc::new(PerformanceMonitor::new(&config.monitoring));
        let scanner = Scanner::new(
            Arc::new(ScriptedClient::new(&[])),
            &config,
            monitor.clone(),
        );

        scanner
            .scan(universe(&["BTCUSDT", "ETHUSDT"]), &CancelToken::new())
            .await
            .unwrap();

        // Every fetch succeeded, so success-rate accounting must not see
        // the filtered records as losses.
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.symbols_completed, 2);
        assert!(!snapshot
            .active_alerts
            .iter()
            .any(|a| matches!(a, HealthAlert::LowSuccessRate { .. })));
    }

    #[tokio::test]
    async fn test_pre_cancelled_scan_returns_cancelled() {
        let config = test_config();
        let scanner = scanner_with(ScriptedClient::new(&[]), &config);

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = scanner
            .scan(universe(&["BTCUSDT", "ETHUSDT"]), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Cancelled));
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_a_config_error() {
        let mut config = test_config();
        config.scanner.concurrency = 0;
        let scanner = scanner_with(ScriptedClient::new(&[]), &config);

        let err = scanner
            .scan(universe(&["BTCUSDT"]), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }

    #[tokio::test]
    async fn test_universe_is_capped_at_max_symbols() {
        let mut config = test_config();
        config.scanner.max_symbols = 2;
        let scanner = scanner_with(ScriptedClient::new(&[]), &config);

        let result = scanner
            .scan(
                universe(&["BTCUSDT", "ETHUSDT", "SOLUSDT", "XRPUSDT"]),
                &CancelToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.records.len(), 2);
    }
}
