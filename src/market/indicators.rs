//! Technical indicator math over kline closes.
//!
//! RSI and MACD are computed locally from fetched klines so the pipeline
//! scores on consistent indicator definitions regardless of what the
//! exchange exposes.

use crate::market::models::{MacdSignal, OiTrend};

pub const RSI_PERIOD: usize = 14;
const MACD_FAST: f64 = 12.0;
const MACD_SLOW: f64 = 26.0;
const MACD_SIGNAL: f64 = 9.0;

/// Relative Strength Index over the trailing `period` price changes.
/// Returns 50.0 (neutral) when there is not enough history.
pub fn rsi(closes: &[f64], period: usize) -> f64 {
    if closes.len() < period + 1 {
        return 50.0;
    }

    let window = &closes[closes.len() - period - 1..];
    let mut gains = 0.0;
    let mut losses = 0.0;
    for pair in window.windows(2) {
        let delta = pair[1] - pair[0];
        if delta > 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }

    if losses == 0.0 {
        return 100.0;
    }

    let rs = (gains / period as f64) / (losses / period as f64);
    100.0 - (100.0 / (1.0 + rs))
}

/// Exponential moving average seeded from the first value.
fn ema(values: &[f64], span: f64) -> Vec<f64> {
    let alpha = 2.0 / (span + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = match values.first() {
        Some(&v) => v,
        None => return out,
    };
    out.push(prev);
    for &v in &values[1..] {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

/// Classify the MACD line against its signal line at the latest close.
/// Neutral when history is too short to distinguish.
pub fn macd_signal(closes: &[f64]) -> MacdSignal {
    if closes.len() < MACD_SLOW as usize + MACD_SIGNAL as usize {
        return MacdSignal::Neutral;
    }

    let fast = ema(closes, MACD_FAST);
    let slow = ema(closes, MACD_SLOW);
    let macd_line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    let signal_line = ema(&macd_line, MACD_SIGNAL);

    let macd = *macd_line.last().unwrap_or(&0.0);
    let signal = *signal_line.last().unwrap_or(&0.0);

    if macd > signal {
        MacdSignal::Bullish
    } else if macd < signal {
        MacdSignal::Bearish
    } else {
        MacdSignal::Neutral
    }
}

/// Minimum relative change in open interest to call a trend.
const OI_FLAT_BAND: f64 = 0.005;

/// Derive the open-interest trend from a recent OI series (oldest first).
pub fn oi_trend(series: &[f64]) -> OiTrend {
    let (Some(&first), Some(&last)) = (series.first(), series.last()) else {
        return OiTrend::Flat;
    };
    if first <= 0.0 {
        return OiTrend::Flat;
    }

    let change = (last - first) / first;
    if change > OI_FLAT_BAND {
        OiTrend::Up
    } else if change < -OI_FLAT_BAND {
        OiTrend::Down
    } else {
        OiTrend::Flat
    }
}
