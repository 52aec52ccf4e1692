//! Adaptive-TTL memoization of per-symbol market data.
//!
//! Volatile symbols expire sooner so their prices stay accurate; stable
//! symbols are reused longer, cutting call volume. The cache is a pure
//! key to entry store with expiry logic; no network calls happen here,
//! and a miss is normal control flow, not an error.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::CacheConfig;
use crate::market::models::{MacdSignal, OiTrend, Symbol};

/// The independently fetched and cached facets of one symbol's snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Ticker,
    Klines,
    FundingRate,
    OpenInterest,
}

impl DataType {
    pub const ALL: [DataType; 4] = [
        DataType::Ticker,
        DataType::Klines,
        DataType::FundingRate,
        DataType::OpenInterest,
    ];
}

/// Price and turnover from the ticker endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickerSnapshot {
    pub price: f64,
    pub volume_24h: f64,
}

/// Indicators derived from one klines fetch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorSnapshot {
    pub rsi: f64,
    pub macd_signal: MacdSignal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Ticker(TickerSnapshot),
    Indicators(IndicatorSnapshot),
    FundingRate(f64),
    OpenInterest(OiTrend),
}

/// One cached value and its expiry. Replaced on refetch, never updated
/// in place.
struct CacheEntry {
    value: CachedValue,
    expires_at: Instant,
}

struct CacheInner {
    entries: HashMap<(Symbol, DataType), CacheEntry>,
    /// Recent ticker prices per symbol, for the volatility estimate.
    prices: HashMap<Symbol, VecDeque<f64>>,
    hits: u64,
    misses: u64,
}

pub struct AdaptiveCache {
    inner: Mutex<CacheInner>,
    config: CacheConfig,
}

impl AdaptiveCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                prices: HashMap::new(),
                hits: 0,
                misses: 0,
            }),
            config,
        }
    }

    /// Return the cached value if present and unexpired. Expired entries
    /// are evicted lazily here.
    pub fn get(&self, symbol: &Symbol, data_type: DataType) -> Option<CachedValue> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let key = (symbol.clone(), data_type);

        match inner.entries.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                let value = entry.value.clone();
                inner.hits += 1;
                Some(value)
            }
            Some(_) => {
                inner.entries.remove(&key);
                inner.misses += 1;
                None
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Store a fresh value under its volatility-adjusted TTL, replacing any
    /// previous entry. Ticker puts also update the symbol's volatility
    /// estimate.
    pub fn put(&self, symbol: &Symbol, data_type: DataType, value: CachedValue) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");

        if let CachedValue::Ticker(ticker) = &value {
            let window = self.config.volatility_window.max(2);
            let prices = inner.prices.entry(symbol.clone()).or_default();
            prices.push_back(ticker.price);
            while prices.len() > window {
                prices.pop_front();
            }
        }

        let ttl = self.ttl_with(&inner, symbol, data_type);

        if self.config.max_entries > 0 && inner.entries.len() >= self.config.max_entries {
            evict_one(&mut inner.entries);
        }

        inner.entries.insert(
            (symbol.clone(), data_type),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// The TTL a put for this key would receive right now.
    pub fn ttl(&self, symbol: &Symbol, data_type: DataType) -> Duration {
        let inner = self.inner.lock().expect("cache lock poisoned");
        self.ttl_with(&inner, symbol, data_type)
    }

    fn ttl_with(&self, inner: &CacheInner, symbol: &Symbol, data_type: DataType) -> Duration {
        let base = Duration::from_secs(match data_type {
            DataType::Ticker => self.config.ticker_ttl_seconds,
            DataType::Klines => self.config.klines_ttl_seconds,
            DataType::FundingRate => self.config.funding_ttl_seconds,
            DataType::OpenInterest => self.config.open_interest_ttl_seconds,
        });

        match volatility(inner.prices.get(symbol)) {
            Some(vol) if vol > self.config.high_volatility_threshold => base / 2,
            Some(vol) if vol < self.config.low_volatility_threshold => base * 2,
            _ => base,
        }
    }

    /// Rolling return-dispersion estimate for a symbol, if enough ticker
    /// history has accumulated.
    pub fn volatility(&self, symbol: &Symbol) -> Option<f64> {
        let inner = self.inner.lock().expect("cache lock poisoned");
        volatility(inner.prices.get(symbol))
    }

    /// Fraction of lookups served from cache since construction.
    pub fn hit_rate(&self) -> f64 {
        let inner = self.inner.lock().expect("cache lock poisoned");
        let total = inner.hits + inner.misses;
        if total == 0 {
            return 0.0;
        }
        inner.hits as f64 / total as f64
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Standard deviation of simple returns over the stored price window.
fn volatility(prices: Option<&VecDeque<f64>>) -> Option<f64> {
    let prices = prices?;
    if prices.len() < 3 {
        return None;
    }

    let returns: Vec<f64> = prices
        .iter()
        .zip(prices.iter().skip(1))
        .filter(|(prev, _)| **prev > 0.0)
        .map(|(prev, next)| (next - prev) / prev)
        .collect();
    if returns.len() < 2 {
        return None;
    }

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Capacity eviction: drop the entry closest to expiry, which is the
/// least valuable one to keep.
fn evict_one(entries: &mut HashMap<(Symbol, DataType), CacheEntry>) {
    let victim = entries
        .iter()
        .min_by_key(|(_, entry)| entry.expires_at)
        .map(|(key, _)| key.clone());
    if let Some(key) = victim {
        entries.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CacheConfig {
        CacheConfig {
            ticker_ttl_seconds: 30,
            klines_ttl_seconds: 120,
            funding_ttl_seconds: 300,
            open_interest_ttl_seconds: 120,
            high_volatility_threshold: 0.05,
            low_volatility_threshold: 0.01,
            volatility_window: 20,
            max_entries: 0,
        }
    }

    fn ticker(price: f64) -> CachedValue {
        CachedValue::Ticker(TickerSnapshot {
            price,
            volume_24h: 1_000_000.0,
        })
    }

    #[test]
    fn test_put_then_get_within_ttl() {
        let cache = AdaptiveCache::new(test_config());
        let btc = Symbol::from("BTCUSDT");

        cache.put(&btc, DataType::Ticker, ticker(50_000.0));
        let got = cache.get(&btc, DataType::Ticker);
        assert_eq!(got, Some(ticker(50_000.0)));
    }

    #[test]
    fn test_get_after_expiry_is_miss() {
        let mut config = test_config();
        // Smallest configurable TTL; sleep past it.
        config.ticker_ttl_seconds = 1;
        let cache = AdaptiveCache::new(config);
        let btc = Symbol::from("BTCUSDT");

        cache.put(&btc, DataType::Ticker, ticker(50_000.0));
        std::thread::sleep(Duration::from_millis(1100));
        assert_eq!(cache.get(&btc, DataType::Ticker), None);
        // Lazy eviction removed the stale entry.
        assert!(cache.is_empty());
    }

    #[test]
    fn test_miss_on_absent_key() {
        let cache = AdaptiveCache::new(test_config());
        assert_eq!(cache.get(&Symbol::from("ETHUSDT"), DataType::Klines), None);
    }

    #[test]
    fn test_high_volatility_halves_ttl() {
        let cache = AdaptiveCache::new(test_config());
        let sym = Symbol::from("DOGEUSDT");

        // Wild swings: returns far above the 5% threshold.
        for price in [1.0, 1.5, 0.9, 1.6, 0.8] {
            cache.put(&sym, DataType::Ticker, ticker(price));
        }
        assert!(cache.volatility(&sym).unwrap() > 0.05);
        assert_eq!(cache.ttl(&sym, DataType::FundingRate), Duration::from_secs(150));
    }

    #[test]
    fn test_low_volatility_doubles_ttl() {
        let cache = AdaptiveCache::new(test_config());
        let sym = Symbol::from("BTCUSDT");

        for price in [100.0, 100.01, 100.02, 100.01, 100.02] {
            cache.put(&sym, DataType::Ticker, ticker(price));
        }
        assert!(cache.volatility(&sym).unwrap() < 0.01);
        assert_eq!(cache.ttl(&sym, DataType::FundingRate), Duration::from_secs(600));
    }

    #[test]
    fn test_unknown_symbol_uses_base_ttl_per_data_type() {
        let cache = AdaptiveCache::new(test_config());
        let sym = Symbol::from("XRPUSDT");

        for data_type in DataType::ALL {
            let expected = match data_type {
                DataType::Ticker => 30,
                DataType::Klines => 120,
                DataType::FundingRate => 300,
                DataType::OpenInterest => 120,
            };
            assert_eq!(cache.ttl(&sym, data_type), Duration::from_secs(expected));
        }
    }

    #[test]
    fn test_capacity_eviction() {
        let mut config = test_config();
        config.max_entries = 2;
        let cache = AdaptiveCache::new(config);

        cache.put(&Symbol::from("AUSDT"), DataType::FundingRate, CachedValue::FundingRate(0.0001));
        cache.put(&Symbol::from("BUSDT"), DataType::FundingRate, CachedValue::FundingRate(0.0002));
        cache.put(&Symbol::from("CUSDT"), DataType::FundingRate, CachedValue::FundingRate(0.0003));

        assert_eq!(cache.len(), 2);
        // Newest entry always survives.
        assert!(cache.get(&Symbol::from("CUSDT"), DataType::FundingRate).is_some());
    }

    #[test]
    fn test_replace_keeps_single_entry() {
        let cache = AdaptiveCache::new(test_config());
        let btc = Symbol::from("BTCUSDT");

        cache.put(&btc, DataType::Ticker, ticker(50_000.0));
        cache.put(&btc, DataType::Ticker, ticker(51_000.0));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&btc, DataType::Ticker), Some(ticker(51_000.0)));
    }

    #[test]
    fn test_hit_rate() {
        let cache = AdaptiveCache::new(test_config());
        let btc = Symbol::from("BTCUSDT");

        cache.put(&btc, DataType::Ticker, ticker(50_000.0));
        cache.get(&btc, DataType::Ticker); // hit
        cache.get(&btc, DataType::Klines); // miss

        assert!((cache.hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
