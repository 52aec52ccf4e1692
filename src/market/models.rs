use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tradable perpetual contract identifier, e.g. "BTCUSDT".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// MACD line position relative to its signal line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MacdSignal {
    Bullish,
    Bearish,
    Neutral,
}

/// Direction of the recent open-interest series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OiTrend {
    Up,
    Down,
    Flat,
}

/// One symbol's market snapshot. Immutable once created; a refetch produces
/// a new record rather than mutating this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRecord {
    pub symbol: Symbol,
    pub price: f64,
    pub volume_24h: f64,
    pub rsi: f64,
    pub macd_signal: MacdSignal,
    pub funding_rate: f64,
    pub open_interest_trend: OiTrend,
    pub fetched_at: DateTime<Utc>,
}

/// Trade direction recommended by the scoring engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
    None,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
            Self::None => write!(f, "NONE"),
        }
    }
}

/// A validated record plus its composite score. Derived and immutable;
/// lives only as long as the scan that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub record: MarketRecord,
    pub score: f64,
    pub direction: Direction,
    /// Pattern names for scoring rules that co-fired (e.g. RSI_MACD_CONFLUENCE).
    pub combo_tags: Vec<String>,
}

impl ScoredRecord {
    pub fn symbol(&self) -> &Symbol {
        &self.record.symbol
    }
}

/// Why a symbol was excluded from a scan's scored output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedSymbol {
    pub symbol: Symbol,
    pub reason: String,
}

/// The ranked output of one orchestration run. Stale results are replaced
/// wholesale by the next scan, never patched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// Scored records, descending by score, ties broken by symbol.
    pub records: Vec<ScoredRecord>,
    /// Symbols whose fetch failed after retries.
    pub skipped: Vec<SkippedSymbol>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ScanResult {
    pub fn top(&self, n: usize) -> &[ScoredRecord] {
        &self.records[..self.records.len().min(n)]
    }

    pub fn best(&self) -> Option<&ScoredRecord> {
        self.records.first()
    }
}
