//! Batch sanity gate between fetching and scoring.
//!
//! Validation never fails a scan. Records that carry impossible values
//! are dropped with a reason and the rest flow through in their original
//! order, so one poisoned upstream response cannot sink a cycle.

use std::collections::BTreeMap;

use tracing::debug;

use crate::market::models::{MarketRecord, SkippedSymbol, Symbol};

/// Prices at or above this are treated as feed corruption.
const MAX_PRICE: f64 = 1_000_000.0;

const MIN_BASE_LEN: usize = 2;
const MAX_BASE_LEN: usize = 8;

/// Result of validating one fetched batch.
#[derive(Debug, Default)]
pub struct ValidationOutcome {
    /// Records that passed every check, in input order.
    pub valid: Vec<MarketRecord>,
    /// Dropped records with the first check they failed.
    pub rejected: Vec<SkippedSymbol>,
}

impl ValidationOutcome {
    /// Rejection counts keyed by failing check, for cycle reporting.
    pub fn rejection_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for skip in &self.rejected {
            *counts.entry(skip.reason.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

/// Validate a fetched batch. Each record is either kept or rejected with
/// the first failing check; relative order of kept records is preserved.
pub fn validate_batch(records: Vec<MarketRecord>) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();

    for record in records {
        match check(&record) {
            None => outcome.valid.push(record),
            Some(reason) => {
                debug!(symbol = %record.symbol, reason, "record rejected by validator");
                outcome.rejected.push(SkippedSymbol {
                    symbol: record.symbol,
                    reason: reason.to_string(),
                });
            }
        }
    }

    outcome
}

fn check(record: &MarketRecord) -> Option<&'static str> {
    if !record.price.is_finite() || !record.volume_24h.is_finite() || !record.rsi.is_finite() {
        return Some("non-finite field");
    }
    if record.price <= 0.0 {
        return Some("non-positive price");
    }
    if record.price >= MAX_PRICE {
        return Some("price out of plausible range");
    }
    if record.volume_24h <= 0.0 {
        return Some("non-positive volume");
    }
    if !(0.0..=100.0).contains(&record.rsi) {
        return Some("rsi out of range");
    }
    None
}

/// Keep only well-formed USDT perpetual symbols: an uppercase alphanumeric
/// base of 2 to 8 characters followed by "USDT". Order is preserved.
pub fn validate_symbols(symbols: Vec<Symbol>) -> Vec<Symbol> {
    symbols
        .into_iter()
        .filter(|s| is_well_formed(s.as_str()))
        .collect()
}

pub fn is_well_formed(symbol: &str) -> bool {
    let Some(base) = symbol.strip_suffix("USDT") else {
        return false;
    };
    (MIN_BASE_LEN..=MAX_BASE_LEN).contains(&base.len())
        && base
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}
