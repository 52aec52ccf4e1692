//! Per-symbol snapshot assembly.
//!
//! Each record is built from four independently cached facets: ticker,
//! klines (folded into RSI and MACD locally), funding rate and the
//! open-interest trend. Every cache miss goes through the rate limiter
//! and its outcome feeds the limiter's adaptation. A record is
//! all-or-nothing: if any facet is still failing after retries the whole
//! symbol is skipped for this scan.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::warn;

use crate::config::ExchangeConfig;
use crate::data::cache::{
    AdaptiveCache, CachedValue, DataType, IndicatorSnapshot, TickerSnapshot,
};
use crate::data::limiter::AdaptiveRateLimiter;
use crate::market::exchange::ExchangeClient;
use crate::market::indicators::{self, RSI_PERIOD};
use crate::market::models::{MarketRecord, OiTrend, Symbol};

#[derive(Debug, Error)]
#[error("fetch failed for {symbol}: {cause}")]
pub struct FetchError {
    pub symbol: Symbol,
    pub cause: String,
}

pub struct FetchStage {
    client: Arc<dyn ExchangeClient>,
    cache: Arc<AdaptiveCache>,
    limiter: Arc<AdaptiveRateLimiter>,
    attempt_timeout: Duration,
    max_retries: u32,
}

impl FetchStage {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        cache: Arc<AdaptiveCache>,
        limiter: Arc<AdaptiveRateLimiter>,
        config: &ExchangeConfig,
    ) -> Self {
        Self {
            client,
            cache,
            limiter,
            attempt_timeout: Duration::from_millis(config.request_timeout_ms),
            max_retries: config.max_retries,
        }
    }

    /// Assemble one symbol's snapshot, serving facets from cache where
    /// possible and fetching the rest under the rate limiter.
    pub async fn fetch_record(&self, symbol: &Symbol) -> Result<MarketRecord, FetchError> {
        let ticker = self.ticker(symbol).await?;
        let indicators = self.indicators(symbol).await?;
        let funding_rate = self.funding_rate(symbol).await?;
        let oi_trend = self.open_interest_trend(symbol).await?;

        Ok(MarketRecord {
            symbol: symbol.clone(),
            price: ticker.price,
            volume_24h: ticker.volume_24h,
            rsi: indicators.rsi,
            macd_signal: indicators.macd_signal,
            funding_rate,
            open_interest_trend: oi_trend,
            fetched_at: Utc::now(),
        })
    }

    async fn ticker(&self, symbol: &Symbol) -> Result<TickerSnapshot, FetchError> {
        if let Some(CachedValue::Ticker(t)) = self.cache.get(symbol, DataType::Ticker) {
            return Ok(t);
        }
        let ticker = self
            .call(symbol, || self.client.fetch_ticker(symbol))
            .await?;
        let snapshot = TickerSnapshot {
            price: ticker.price,
            volume_24h: ticker.volume_24h,
        };
        self.cache
            .put(symbol, DataType::Ticker, CachedValue::Ticker(snapshot));
        Ok(snapshot)
    }

    async fn indicators(&self, symbol: &Symbol) -> Result<IndicatorSnapshot, FetchError> {
        if let Some(CachedValue::Indicators(i)) = self.cache.get(symbol, DataType::Klines) {
            return Ok(i);
        }
        let closes = self
            .call(symbol, || self.client.fetch_klines(symbol))
            .await?;
        let snapshot = IndicatorSnapshot {
            rsi: indicators::rsi(&closes, RSI_PERIOD),
            macd_signal: indicators::macd_signal(&closes),
        };
        self.cache
            .put(symbol, DataType::Klines, CachedValue::Indicators(snapshot));
        Ok(snapshot)
    }

    async fn funding_rate(&self, symbol: &Symbol) -> Result<f64, FetchError> {
        if let Some(CachedValue::FundingRate(rate)) =
            self.cache.get(symbol, DataType::FundingRate)
        {
            return Ok(rate);
        }
        let rate = self
            .call(symbol, || self.client.fetch_funding_rate(symbol))
            .await?;
        self.cache
            .put(symbol, DataType::FundingRate, CachedValue::FundingRate(rate));
        Ok(rate)
    }

    async fn open_interest_trend(&self, symbol: &Symbol) -> Result<OiTrend, FetchError> {
        if let Some(CachedValue::OpenInterest(trend)) =
            self.cache.get(symbol, DataType::OpenInterest)
        {
            return Ok(trend);
        }
        let series = self
            .call(symbol, || self.client.fetch_open_interest(symbol))
            .await?;
        let trend = indicators::oi_trend(&series);
        self.cache.put(
            symbol,
            DataType::OpenInterest,
            CachedValue::OpenInterest(trend),
        );
        Ok(trend)
    }

    /// Run one exchange call under the limiter with per-attempt timeout
    /// and bounded retries. Every attempt's outcome is reported.
    async fn call<F, Fut, T>(&self, symbol: &Symbol, op: F) -> Result<T, FetchError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, crate::market::exchange::ExchangeError>>,
    {
        let mut last_cause = String::new();

        for attempt in 0..=self.max_retries {
            self.limiter.acquire().await;

            match tokio::time::timeout(self.attempt_timeout, op()).await {
                Ok(Ok(value)) => {
                    self.limiter.report_outcome(true).await;
                    return Ok(value);
                }
                Ok(Err(err)) => {
                    self.limiter.report_outcome(false).await;
                    if err.is_rate_limit() {
                        warn!(symbol = %symbol, attempt, "exchange rate limit hit");
                    }
                    last_cause = err.to_string();
                }
                Err(_) => {
                    self.limiter.report_outcome(false).await;
                    last_cause =
                        format!("timed out after {}ms", self.attempt_timeout.as_millis());
                }
            }
        }

        Err(FetchError {
            symbol: symbol.clone(),
            cause: last_cause,
        })
    }
}
