//! Composite scoring of validated market records.
//!
//! Both direction tables are evaluated for every record; the higher side
//! wins and ties go long. Scoring is a pure function of the record and
//! the volume threshold, so rescoring the same input is always a no-op.

pub mod rules;

use crate::market::models::{Direction, MarketRecord, ScoredRecord};
use rules::{evaluate, score_of, FiredRule};

pub const RSI_MACD_CONFLUENCE: &str = "RSI_MACD_CONFLUENCE";
pub const FULL_CONFLUENCE: &str = "FULL_CONFLUENCE";

pub struct ScoringEngine {
    high_volume_threshold: f64,
}

impl ScoringEngine {
    pub fn new(high_volume_threshold: f64) -> Self {
        Self {
            high_volume_threshold,
        }
    }

    /// Score one record against both direction tables.
    pub fn score(&self, record: MarketRecord) -> ScoredRecord {
        let long = evaluate(Direction::Long, &record, self.high_volume_threshold);
        let short = evaluate(Direction::Short, &record, self.high_volume_threshold);

        let long_score = score_of(&long);
        let short_score = score_of(&short);

        // Ties resolve long; a zero score still reports a direction of None.
        let (score, direction, fired) = if short_score > long_score {
            (short_score, Direction::Short, short)
        } else if long_score > 0.0 {
            (long_score, Direction::Long, long)
        } else {
            (0.0, Direction::None, Vec::new())
        };

        let combo_tags = combo_tags(&fired);

        ScoredRecord {
            record,
            score,
            direction,
            combo_tags,
        }
    }

    /// Score a whole validated batch, preserving input order.
    pub fn score_batch(&self, records: Vec<MarketRecord>) -> Vec<ScoredRecord> {
        records.into_iter().map(|r| self.score(r)).collect()
    }
}

/// Pattern tags for rules that co-fired on the winning side.
fn combo_tags(fired: &[FiredRule]) -> Vec<String> {
    let hit = |prefix: &str| fired.iter().any(|f| f.name.starts_with(prefix));

    let mut tags = Vec::new();
    if hit("rsi") && hit("macd") {
        tags.push(RSI_MACD_CONFLUENCE.to_string());
    }
    if fired.len() == 5 {
        tags.push(FULL_CONFLUENCE.to_string());
    }
    tags
}
