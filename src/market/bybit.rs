//! Bybit v5 REST client for linear perpetuals.
//!
//! Talks to the public market-data endpoints over plain `reqwest`.
//! Bybit returns numeric fields as JSON strings and lists newest-first;
//! both quirks are normalized here so the rest of the pipeline sees
//! plain floats, oldest-first.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::ExchangeConfig;
use crate::market::exchange::{ExchangeClient, ExchangeError, Ticker};
use crate::market::models::Symbol;

/// Bybit retCode for "too many visits".
const RET_CODE_RATE_LIMIT: i64 = 10006;

/// Hand-picked liquid perpetuals used when the instruments endpoint is
/// unreachable at startup.
pub const FALLBACK_UNIVERSE: &[&str] = &[
    "BTCUSDT", "ETHUSDT", "BNBUSDT", "XRPUSDT", "ADAUSDT", "SOLUSDT",
    "DOGEUSDT", "DOTUSDT", "AVAXUSDT", "LTCUSDT", "UNIUSDT", "LINKUSDT",
    "ATOMUSDT", "XLMUSDT", "BCHUSDT", "FILUSDT", "TRXUSDT", "ETCUSDT",
    "AAVEUSDT", "ALGOUSDT",
];

pub struct BybitClient {
    http: reqwest::Client,
    base_url: String,
    kline_interval: String,
    kline_limit: u32,
}

impl BybitClient {
    pub fn new(config: &ExchangeConfig) -> Result<Self, ExchangeError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ExchangeError::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            kline_interval: config.kline_interval.clone(),
            kline_limit: config.kline_limit,
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ExchangeError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| ExchangeError::Http(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ExchangeError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| ExchangeError::Parse(e.to_string()))?;

        if envelope.ret_code == RET_CODE_RATE_LIMIT {
            return Err(ExchangeError::RateLimited);
        }
        if envelope.ret_code != 0 {
            return Err(ExchangeError::Api {
                code: envelope.ret_code,
                message: envelope.ret_msg,
            });
        }

        envelope
            .result
            .ok_or_else(|| ExchangeError::Parse("missing result field".to_string()))
    }
}

#[async_trait]
impl ExchangeClient for BybitClient {
    /// Load the tradable USDT linear-perpetual universe, filtered the way
    /// the scanner expects: trading status, reasonable symbol length.
    async fn fetch_instruments(&self) -> Result<Vec<Symbol>, ExchangeError> {
        let result: InstrumentsResult = self
            .get(
                "/v5/market/instruments-info",
                &[("category", "linear"), ("limit", "1000")],
            )
            .await?;

        let symbols = result
            .list
            .into_iter()
            .filter(|i| {
                i.symbol.ends_with("USDT")
                    && i.status == "Trading"
                    && i.contract_type.as_deref() == Some("LinearPerpetual")
                    && i.symbol.len() <= 12
            })
            .map(|i| Symbol(i.symbol))
            .collect();

        Ok(symbols)
    }

    async fn fetch_ticker(&self, symbol: &Symbol) -> Result<Ticker, ExchangeError> {
        let result: TickerResult = self
            .get(
                "/v5/market/tickers",
                &[("category", "linear"), ("symbol", symbol.as_str())],
            )
            .await?;

        let item = result
            .list
            .into_iter()
            .next()
            .ok_or_else(|| ExchangeError::Parse(format!("no ticker data for {symbol}")))?;

        Ok(Ticker {
            price: parse_f64("lastPrice", &item.last_price)?,
            volume_24h: parse_f64("turnover24h", &item.turnover_24h)?,
        })
    }

    async fn fetch_klines(&self, symbol: &Symbol) -> Result<Vec<f64>, ExchangeError> {
        let limit = self.kline_limit.to_string();
        let result: KlineResult = self
            .get(
                "/v5/market/kline",
                &[
                    ("category", "linear"),
                    ("symbol", symbol.as_str()),
                    ("interval", &self.kline_interval),
                    ("limit", &limit),
                ],
            )
            .await?;

        // Bybit lists klines newest-first; indicators want oldest-first.
        // Row layout: [startTime, open, high, low, close, volume, turnover].
        let mut closes = Vec::with_capacity(result.list.len());
        for row in result.list.iter().rev() {
            let close = row
                .get(4)
                .ok_or_else(|| ExchangeError::Parse("kline row too short".to_string()))?;
            closes.push(parse_f64("close", close)?);
        }
        Ok(closes)
    }

    async fn fetch_funding_rate(&self, symbol: &Symbol) -> Result<f64, ExchangeError> {
        let result: FundingResult = self
            .get(
                "/v5/market/funding/history",
                &[
                    ("category", "linear"),
                    ("symbol", symbol.as_str()),
                    ("limit", "1"),
                ],
            )
            .await?;

        let item = result
            .list
            .into_iter()
            .next()
            .ok_or_else(|| ExchangeError::Parse(format!("no funding data for {symbol}")))?;

        parse_f64("fundingRate", &item.funding_rate)
    }

    async fn fetch_open_interest(&self, symbol: &Symbol) -> Result<Vec<f64>, ExchangeError> {
        let result: OpenInterestResult = self
            .get(
                "/v5/market/open-interest",
                &[
                    ("category", "linear"),
                    ("symbol", symbol.as_str()),
                    ("intervalTime", "15min"),
                    ("limit", "12"),
                ],
            )
            .await?;

        // Newest-first, same as klines.
        let mut series = Vec::with_capacity(result.list.len());
        for item in result.list.iter().rev() {
            series.push(parse_f64("openInterest", &item.open_interest)?);
        }
        Ok(series)
    }
}

fn parse_f64(field: &str, raw: &str) -> Result<f64, ExchangeError> {
    raw.parse::<f64>()
        .map_err(|_| ExchangeError::Parse(format!("invalid {field}: {raw:?}")))
}

// --- Bybit v5 response types ---

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg", default)]
    ret_msg: String,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TickerResult {
    list: Vec<TickerItem>,
}

#[derive(Debug, Deserialize)]
struct TickerItem {
    #[serde(rename = "lastPrice")]
    last_price: String,
    #[serde(rename = "turnover24h")]
    turnover_24h: String,
}

#[derive(Debug, Deserialize)]
struct KlineResult {
    list: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct FundingResult {
    list: Vec<FundingItem>,
}

#[derive(Debug, Deserialize)]
struct FundingItem {
    #[serde(rename = "fundingRate")]
    funding_rate: String,
}

#[derive(Debug, Deserialize)]
struct OpenInterestResult {
    list: Vec<OpenInterestItem>,
}

#[derive(Debug, Deserialize)]
struct OpenInterestItem {
    #[serde(rename = "openInterest")]
    open_interest: String,
}

#[derive(Debug, Deserialize)]
struct InstrumentsResult {
    list: Vec<InstrumentItem>,
}

#[derive(Debug, Deserialize)]
struct InstrumentItem {
    symbol: String,
    status: String,
    #[serde(rename = "contractType")]
    contract_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> BybitClient {
        BybitClient::new(&ExchangeConfig {
            base_url: base_url.to_string(),
            request_timeout_ms: 2000,
            max_retries: 2,
            kline_interval: "15".to_string(),
            kline_limit: 100,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_ticker_parses_string_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v5/market/tickers"))
            .and(query_param("symbol", "BTCUSDT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "retCode": 0,
                "retMsg": "OK",
                "result": {
                    "list": [{"lastPrice": "50123.5", "turnover24h": "12345678.9"}]
                }
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let ticker = client.fetch_ticker(&Symbol::from("BTCUSDT")).await.unwrap();
        assert_eq!(ticker.price, 50123.5);
        assert_eq!(ticker.volume_24h, 12_345_678.9);
    }

    #[tokio::test]
    async fn test_ret_code_rate_limit_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v5/market/tickers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "retCode": 10006,
                "retMsg": "Too many visits",
                "result": null
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .fetch_ticker(&Symbol::from("BTCUSDT"))
            .await
            .unwrap_err();
        assert!(err.is_rate_limit());
    }

    #[tokio::test]
    async fn test_http_429_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v5/market/funding/history"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .fetch_funding_rate(&Symbol::from("BTCUSDT"))
            .await
            .unwrap_err();
        assert!(err.is_rate_limit());
    }

    #[tokio::test]
    async fn test_fetch_klines_reverses_to_oldest_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v5/market/kline"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "retCode": 0,
                "retMsg": "OK",
                "result": {
                    "list": [
                        ["1700000900000", "102", "103", "101", "102.5", "10", "1000"],
                        ["1700000000000", "100", "101", "99", "100.5", "10", "1000"]
                    ]
                }
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let closes = client.fetch_klines(&Symbol::from("ETHUSDT")).await.unwrap();
        assert_eq!(closes, vec![100.5, 102.5]);
    }

    #[tokio::test]
    async fn test_api_error_surfaces_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v5/market/tickers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "retCode": 10001,
                "retMsg": "params error",
                "result": null
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .fetch_ticker(&Symbol::from("NOPEUSDT"))
            .await
            .unwrap_err();
        match err {
            ExchangeError::Api { code, .. } => assert_eq!(code, 10001),
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_instruments_filters_universe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v5/market/instruments-info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "retCode": 0,
                "retMsg": "OK",
                "result": {
                    "list": [
                        {"symbol": "BTCUSDT", "status": "Trading", "contractType": "LinearPerpetual"},
                        {"symbol": "ETHBTC", "status": "Trading", "contractType": "LinearPerpetual"},
                        {"symbol": "OLDUSDT", "status": "Closed", "contractType": "LinearPerpetual"},
                        {"symbol": "QUARTERLYBTCUSDT", "status": "Trading", "contractType": "LinearPerpetual"},
                        {"symbol": "SOLUSDT", "status": "Trading", "contractType": "LinearFutures"}
                    ]
                }
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let universe = client.fetch_instruments().await.unwrap();
        assert_eq!(universe, vec![Symbol::from("BTCUSDT")]);
    }
}
