//! Shared data plumbing for the scan pipeline: the adaptive fetch cache
//! and the adaptive rate limiter. These are the only cross-worker shared
//! mutable structures; each owns its synchronization internally.

pub mod cache;
pub mod limiter;
