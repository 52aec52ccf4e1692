//! Target alerts for high-scoring setups.
//!
//! When a scan's best record clears the configured threshold, a single
//! structured alert is logged. A cooldown suppresses repeats so a setup
//! that persists across cycles does not spam the log.

use std::time::{Duration, Instant};

use tracing::warn;

use crate::config::EngineConfig;
use crate::market::models::ScoredRecord;

pub struct AlertManager {
    threshold: f64,
    cooldown: Duration,
    last_alert_at: Option<Instant>,
}

impl AlertManager {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            threshold: config.alert_threshold,
            cooldown: Duration::from_secs(config.alert_cooldown_seconds),
            last_alert_at: None,
        }
    }

    /// Emit a target alert if the record clears the threshold and the
    /// cooldown has elapsed. Returns whether an alert was emitted.
    pub fn maybe_alert(&mut self, best: &ScoredRecord) -> bool {
        if best.score < self.threshold {
            return false;
        }
        if let Some(last) = self.last_alert_at {
            if last.elapsed() < self.cooldown {
                return false;
            }
        }

        warn!(
            symbol = %best.symbol(),
            score = best.score,
            direction = %best.direction,
            combo_tags = ?best.combo_tags,
            price = best.record.price,
            rsi = best.record.rsi,
            funding_rate = best.record.funding_rate,
            "Target detected"
        );
        self.last_alert_at = Some(Instant::now());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::models::{Direction, MacdSignal, MarketRecord, OiTrend, Symbol};
    use chrono::Utc;

    fn scored(score: f64) -> ScoredRecord {
        ScoredRecord {
            record: MarketRecord {
                symbol: Symbol::from("BTCUSDT"),
                price: 50_000.0,
                volume_24h: 20_000_000.0,
                rsi: 28.0,
                macd_signal: MacdSignal::Bullish,
                funding_rate: -0.0003,
                open_interest_trend: OiTrend::Up,
                fetched_at: Utc::now(),
            },
            score,
            direction: Direction::Long,
            combo_tags: vec![],
        }
    }

    fn manager(threshold: f64, cooldown_seconds: u64) -> AlertManager {
        AlertManager::new(&EngineConfig {
            scan_interval_seconds: 900,
            alert_threshold: threshold,
            alert_cooldown_seconds: cooldown_seconds,
        })
    }

    #[test]
    fn test_below_threshold_is_silent() {
        let mut alerts = manager(7.0, 300);
        assert!(!alerts.maybe_alert(&scored(6.5)));
    }

    #[test]
    fn test_above_threshold_alerts_once_within_cooldown() {
        let mut alerts = manager(7.0, 300);
        assert!(alerts.maybe_alert(&scored(8.0)));
        assert!(!alerts.maybe_alert(&scored(8.0)), "cooldown suppresses repeat");
    }

    #[test]
    fn test_zero_cooldown_allows_back_to_back_alerts() {
        let mut alerts = manager(7.0, 0);
        assert!(alerts.maybe_alert(&scored(8.0)));
        assert!(alerts.maybe_alert(&scored(7.0)));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut alerts = manager(7.0, 300);
        assert!(alerts.maybe_alert(&scored(7.0)));
    }
}
