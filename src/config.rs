use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

/// A configuration problem that must abort startup before any scan runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("scanner.concurrency must be at least 1, got {0}")]
    InvalidConcurrency(usize),
    #[error("scanner.min_score must be non-negative, got {0}")]
    InvalidMinScore(f64),
    #[error("rate_limit.min_delay_ms ({min}) must not exceed rate_limit.max_delay_ms ({max})")]
    InvalidDelayBounds { min: u64, max: u64 },
    #[error("rate_limit.window_size must be at least 1")]
    EmptyOutcomeWindow,
    #[error("cache.{0}_ttl_seconds must be positive")]
    ZeroTtl(&'static str),
    #[error(
        "cache.low_volatility_threshold ({low}) must be below cache.high_volatility_threshold ({high})"
    )]
    InvalidVolatilityBand { low: f64, high: f64 },
    #[error("scoring.high_volume_threshold must be positive, got {0}")]
    InvalidVolumeThreshold(f64),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub scanner: ScannerConfig,
    pub exchange: ExchangeConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub scoring: ScoringConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Seconds between scan cycles.
    pub scan_interval_seconds: u64,
    /// Best score required before a target alert is emitted.
    pub alert_threshold: f64,
    /// Minimum seconds between consecutive target alerts.
    pub alert_cooldown_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// Worker cap for the fetch fan-out.
    pub concurrency: usize,
    /// Filter floor applied after scoring (0 = no filter).
    pub min_score: f64,
    /// Cap on the symbol universe size.
    pub max_symbols: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    pub base_url: String,
    /// Per-attempt fetch timeout.
    pub request_timeout_ms: u64,
    /// Retries after the first failed attempt of each sub-fetch.
    pub max_retries: u32,
    /// Kline interval in exchange notation (minutes for Bybit linear).
    pub kline_interval: String,
    pub kline_limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub ticker_ttl_seconds: u64,
    pub klines_ttl_seconds: u64,
    pub funding_ttl_seconds: u64,
    pub open_interest_ttl_seconds: u64,
    /// Return dispersion above which TTLs are halved.
    pub high_volatility_threshold: f64,
    /// Return dispersion below which TTLs are doubled.
    pub low_volatility_threshold: f64,
    /// Number of recent ticker prices kept per symbol for the estimate.
    pub volatility_window: usize,
    /// Capacity bound; 0 disables capacity eviction.
    pub max_entries: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub initial_delay_ms: u64,
    /// Rolling outcome window used for the success-rate signal.
    pub window_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// 24h turnover (quote units) above which volume counts as "high".
    pub high_volume_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub log_level: String,
    /// Alert when scan success rate drops below this.
    pub min_success_rate: f64,
    /// Alert when cache hit rate drops below this.
    pub min_cache_hit_rate: f64,
    /// Alert when throughput (symbols/sec) drops below this.
    pub min_throughput: f64,
    /// Port for the local metrics snapshot endpoint.
    pub metrics_port: u16,
}

impl AppConfig {
    /// Load configuration from a TOML file, after sourcing `.env`.
    pub fn load(path: &Path) -> Result<Self> {
        dotenvy::dotenv().ok();

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject malformed knobs before any work starts. This is the only
    /// scan-level failure mode; everything downstream degrades per symbol.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scanner.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency(self.scanner.concurrency));
        }
        if !(self.scanner.min_score >= 0.0) {
            return Err(ConfigError::InvalidMinScore(self.scanner.min_score));
        }
        if self.rate_limit.min_delay_ms > self.rate_limit.max_delay_ms {
            return Err(ConfigError::InvalidDelayBounds {
                min: self.rate_limit.min_delay_ms,
                max: self.rate_limit.max_delay_ms,
            });
        }
        if self.rate_limit.window_size == 0 {
            return Err(ConfigError::EmptyOutcomeWindow);
        }
        for (name, ttl) in [
            ("ticker", self.cache.ticker_ttl_seconds),
            ("klines", self.cache.klines_ttl_seconds),
            ("funding", self.cache.funding_ttl_seconds),
            ("open_interest", self.cache.open_interest_ttl_seconds),
        ] {
            if ttl == 0 {
                return Err(ConfigError::ZeroTtl(name));
            }
        }
        if self.cache.low_volatility_threshold >= self.cache.high_volatility_threshold {
            return Err(ConfigError::InvalidVolatilityBand {
                low: self.cache.low_volatility_threshold,
                high: self.cache.high_volatility_threshold,
            });
        }
        if !(self.scoring.high_volume_threshold > 0.0) {
            return Err(ConfigError::InvalidVolumeThreshold(
                self.scoring.high_volume_threshold,
            ));
        }
        Ok(())
    }
}
