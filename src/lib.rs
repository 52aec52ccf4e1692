//! Parallel futures market scanner.
//!
//! Scans the USDT linear-perpetual universe on an interval, assembles
//! per-symbol snapshots under an adaptive cache and rate limiter,
//! validates them in batch and ranks them with fixed directional scoring
//! tables.

pub mod config;
pub mod data;
pub mod engine;
pub mod market;
pub mod monitoring;
pub mod scoring;
