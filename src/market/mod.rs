//! Market scanning pipeline: exchange access, per-symbol snapshot
//! assembly, batch validation and the scan orchestrator.

pub mod bybit;
pub mod exchange;
pub mod fetch;
pub mod indicators;
pub mod models;
pub mod scanner;
pub mod validator;
