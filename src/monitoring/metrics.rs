//! Scan performance tracking.
//!
//! Aggregates per-cycle scan statistics, exposes a serializable snapshot
//! for the metrics endpoint, and raises health alerts when throughput,
//! success rate or cache efficiency degrade past configured floors.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::config::MonitoringConfig;

/// Statistics for one completed scan cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ScanStats {
    /// Symbols the scan attempted.
    pub attempted: usize,
    /// Symbols that produced a scored record.
    pub completed: usize,
    /// Symbols skipped by fetch failure or validation.
    pub skipped: usize,
    pub duration_ms: u64,
    pub cache_hit_rate: f64,
    pub api_success_rate: f64,
    pub limiter_delay_ms: u64,
}

impl ScanStats {
    /// Fraction of attempted symbols that made it to scoring.
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            return 1.0;
        }
        self.completed as f64 / self.attempted as f64
    }

    /// Symbols processed per second.
    pub fn throughput(&self) -> f64 {
        if self.duration_ms == 0 {
            return self.attempted as f64;
        }
        self.attempted as f64 / (self.duration_ms as f64 / 1000.0)
    }
}

/// A degraded-health condition detected after a scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum HealthAlert {
    LowSuccessRate { rate: f64, floor: f64 },
    LowCacheHitRate { rate: f64, floor: f64 },
    LowThroughput { rate: f64, floor: f64 },
}

impl std::fmt::Display for HealthAlert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LowSuccessRate { rate, floor } => {
                write!(f, "scan success rate {rate:.2} below {floor:.2}")
            }
            Self::LowCacheHitRate { rate, floor } => {
                write!(f, "cache hit rate {rate:.2} below {floor:.2}")
            }
            Self::LowThroughput { rate, floor } => {
                write!(f, "throughput {rate:.1}/s below {floor:.1}/s")
            }
        }
    }
}

/// Serializable view of everything the monitor knows.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub scans_completed: u64,
    pub symbols_attempted: u64,
    pub symbols_completed: u64,
    pub symbols_skipped: u64,
    pub started_at: DateTime<Utc>,
    /// Symbols per second in the most recent scan.
    pub throughput: Option<f64>,
    pub last_scan: Option<ScanStats>,
    pub active_alerts: Vec<HealthAlert>,
}

struct MonitorState {
    scans_completed: u64,
    symbols_attempted: u64,
    symbols_completed: u64,
    symbols_skipped: u64,
    started_at: DateTime<Utc>,
    last_scan: Option<ScanStats>,
    active_alerts: Vec<HealthAlert>,
}

pub struct PerformanceMonitor {
    state: Mutex<MonitorState>,
    min_success_rate: f64,
    min_cache_hit_rate: f64,
    min_throughput: f64,
}

impl PerformanceMonitor {
    pub fn new(config: &MonitoringConfig) -> Self {
        Self {
            state: Mutex::new(MonitorState {
                scans_completed: 0,
                symbols_attempted: 0,
                symbols_completed: 0,
                symbols_skipped: 0,
                started_at: Utc::now(),
                last_scan: None,
                active_alerts: Vec::new(),
            }),
            min_success_rate: config.min_success_rate,
            min_cache_hit_rate: config.min_cache_hit_rate,
            min_throughput: config.min_throughput,
        }
    }

    /// Fold one scan's statistics into the running totals and return any
    /// health alerts it triggered.
    pub fn observe(&self, stats: ScanStats) -> Vec<HealthAlert> {
        let alerts = self.check(&stats);

        let mut state = self.state.lock().expect("monitor lock poisoned");
        state.scans_completed += 1;
        state.symbols_attempted += stats.attempted as u64;
        state.symbols_completed += stats.completed as u64;
        state.symbols_skipped += stats.skipped as u64;
        state.last_scan = Some(stats);
        state.active_alerts = alerts.clone();

        alerts
    }

    fn check(&self, stats: &ScanStats) -> Vec<HealthAlert> {
        let mut alerts = Vec::new();

        let success = stats.success_rate();
        if success < self.min_success_rate {
            alerts.push(HealthAlert::LowSuccessRate {
                rate: success,
                floor: self.min_success_rate,
            });
        }
        if stats.cache_hit_rate < self.min_cache_hit_rate {
            alerts.push(HealthAlert::LowCacheHitRate {
                rate: stats.cache_hit_rate,
                floor: self.min_cache_hit_rate,
            });
        }
        let throughput = stats.throughput();
        if throughput < self.min_throughput {
            alerts.push(HealthAlert::LowThroughput {
                rate: throughput,
                floor: self.min_throughput,
            });
        }

        alerts
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.lock().expect("monitor lock poisoned");
        MetricsSnapshot {
            scans_completed: state.scans_completed,
            symbols_attempted: state.symbols_attempted,
            symbols_completed: state.symbols_completed,
            symbols_skipped: state.symbols_skipped,
            started_at: state.started_at,
            throughput: state.last_scan.as_ref().map(ScanStats::throughput),
            last_scan: state.last_scan.clone(),
            active_alerts: state.active_alerts.clone(),
        }
    }
}

/// Log a one-line scan summary.
pub fn log_scan_summary(stats: &ScanStats) {
    info!(
        attempted = stats.attempted,
        completed = stats.completed,
        skipped = stats.skipped,
        duration_ms = stats.duration_ms,
        success_rate = %format!("{:.2}", stats.success_rate()),
        cache_hit_rate = %format!("{:.2}", stats.cache_hit_rate),
        api_success_rate = %format!("{:.2}", stats.api_success_rate),
        limiter_delay_ms = stats.limiter_delay_ms,
        throughput = %format!("{:.1}", stats.throughput()),
        "Scan cycle complete"
    );
}
