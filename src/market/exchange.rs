//! Exchange collaborator boundary.
//!
//! The scan pipeline only ever talks to the exchange through this trait;
//! the Fetch Stage is its sole caller in production code.

use async_trait::async_trait;
use thiserror::Error;

use crate::market::models::Symbol;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("exchange error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("rate limited by exchange")]
    RateLimited,

    #[error("response parsing error: {0}")]
    Parse(String),
}

impl ExchangeError {
    /// Rate-limit rejections feed the limiter's backoff harder than other
    /// failures in log output, but both count as failed outcomes.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

/// Last price and 24h turnover for one symbol.
#[derive(Debug, Clone, Copy)]
pub struct Ticker {
    pub price: f64,
    pub volume_24h: f64,
}

/// Market data source collaborator. Implementations are HTTP clients;
/// tests substitute deterministic fakes.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Tradable perpetual symbols, unfiltered beyond exchange-side status.
    async fn fetch_instruments(&self) -> Result<Vec<Symbol>, ExchangeError>;

    /// Latest ticker for a symbol.
    async fn fetch_ticker(&self, symbol: &Symbol) -> Result<Ticker, ExchangeError>;

    /// Recent kline closes, oldest first.
    async fn fetch_klines(&self, symbol: &Symbol) -> Result<Vec<f64>, ExchangeError>;

    /// Current funding rate (sign significant).
    async fn fetch_funding_rate(&self, symbol: &Symbol) -> Result<f64, ExchangeError>;

    /// Recent open-interest values, oldest first.
    async fn fetch_open_interest(&self, symbol: &Symbol) -> Result<Vec<f64>, ExchangeError>;
}
