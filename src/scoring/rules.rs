//! Fixed rule tables for directional scoring.
//!
//! Each direction has five weighted conditions. Weights are deliberate
//! constants, not configuration: retuning them is a code change that
//! should show up in review, not a deploy-time knob.

use crate::market::models::{Direction, MacdSignal, MarketRecord, OiTrend};

pub const RSI_OVERSOLD: f64 = 35.0;
pub const RSI_OVERBOUGHT: f64 = 70.0;

pub const RSI_POINTS: f64 = 3.0;
pub const MACD_POINTS: f64 = 2.0;
pub const FUNDING_POINTS: f64 = 1.0;
pub const VOLUME_POINTS: f64 = 1.0;
pub const OI_POINTS: f64 = 1.0;

/// Maximum score either table can award.
pub const MAX_SCORE: f64 =
    RSI_POINTS + MACD_POINTS + FUNDING_POINTS + VOLUME_POINTS + OI_POINTS;

/// One fired rule: its table name and the points it contributed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiredRule {
    pub name: &'static str,
    pub points: f64,
}

/// Evaluate one direction's table against a record. Returns the fired
/// rules in table order; the score is their point sum.
pub fn evaluate(
    direction: Direction,
    record: &MarketRecord,
    high_volume_threshold: f64,
) -> Vec<FiredRule> {
    let mut fired = Vec::new();
    let mut apply = |hit: bool, name: &'static str, points: f64| {
        if hit {
            fired.push(FiredRule { name, points });
        }
    };

    match direction {
        Direction::Long => {
            apply(record.rsi < RSI_OVERSOLD, "rsi_oversold", RSI_POINTS);
            apply(
                record.macd_signal == MacdSignal::Bullish,
                "macd_bullish",
                MACD_POINTS,
            );
            apply(record.funding_rate < 0.0, "funding_negative", FUNDING_POINTS);
            apply(
                record.volume_24h > high_volume_threshold,
                "volume_high",
                VOLUME_POINTS,
            );
            apply(
                record.open_interest_trend == OiTrend::Up,
                "oi_rising",
                OI_POINTS,
            );
        }
        Direction::Short => {
            apply(record.rsi > RSI_OVERBOUGHT, "rsi_overbought", RSI_POINTS);
            apply(
                record.macd_signal == MacdSignal::Bearish,
                "macd_bearish",
                MACD_POINTS,
            );
            apply(record.funding_rate > 0.0, "funding_positive", FUNDING_POINTS);
            apply(
                record.volume_24h > high_volume_threshold,
                "volume_high",
                VOLUME_POINTS,
            );
            apply(
                record.open_interest_trend == OiTrend::Down,
                "oi_falling",
                OI_POINTS,
            );
        }
        Direction::None => {}
    }

    fired
}

pub fn score_of(fired: &[FiredRule]) -> f64 {
    fired.iter().map(|r| r.points).sum()
}
