use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute key the screener uses for the symbol
pub const TICKER_KEY: &str = "Ticker";

/// Header variant the screener has been seen to emit instead of `Ticker`
const MANGLED_TICKER_KEY: &str = "Ticker\n\n";

/// Screener attributes never carried into results
const DROPPED_ATTRIBUTES: &[&str] = &["P/E"];

/// One trading day of price data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Daily bars for one ticker, ascending by date with unique dates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    ticker: String,
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Build a series from bars in any order.
    ///
    /// Bars are sorted by date; when a date repeats the last occurrence wins.
    /// Bars with a non-finite or non-positive close are dropped.
    pub fn new(ticker: impl Into<String>, bars: Vec<PriceBar>) -> Self {
        let ticker = ticker.into();
        let mut by_date: BTreeMap<NaiveDate, PriceBar> = BTreeMap::new();

        for bar in bars {
            if !bar.close.is_finite() || bar.close <= 0.0 {
                tracing::warn!(ticker = %ticker, date = %bar.date, close = bar.close, "Dropping bar with invalid close");
                continue;
            }
            by_date.insert(bar.date, bar);
        }

        Self {
            ticker,
            bars: by_date.into_values().collect(),
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Closing prices, oldest first. Literal close, never adjusted close.
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }
}

/// Opaque screener attribute value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(v) => write!(f, "{}", v),
            AttributeValue::Integer(v) => write!(f, "{}", v),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// A ticker surfaced by the screener, with its pass-through attributes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateRecord {
    pub ticker: String,
    /// All screener columns in their original order, `Ticker` included
    pub attributes: IndexMap<String, AttributeValue>,
}

impl CandidateRecord {
    /// Candidate with no attributes besides the ticker
    pub fn new(ticker: impl Into<String>) -> Self {
        let ticker = ticker.into();
        let mut attributes = IndexMap::new();
        attributes.insert(TICKER_KEY.to_string(), AttributeValue::Text(ticker.clone()));
        Self { ticker, attributes }
    }

    /// Build a candidate from a raw screener row.
    ///
    /// Returns `None` if the row has no non-empty textual ticker.
    pub fn from_attributes(mut attributes: IndexMap<String, AttributeValue>) -> Option<Self> {
        if let Some(index) = attributes.get_index_of(MANGLED_TICKER_KEY) {
            if let Some((_, value)) = attributes.shift_remove_index(index) {
                attributes.shift_insert(index, TICKER_KEY.to_string(), value);
            }
        }

        for key in DROPPED_ATTRIBUTES {
            attributes.shift_remove(*key);
        }

        let ticker = match attributes.get(TICKER_KEY)? {
            AttributeValue::Text(t) if !t.trim().is_empty() => t.trim().to_string(),
            _ => return None,
        };

        Some(Self { ticker, attributes })
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Derived trend statistics for one evaluation; never cached
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TrendMetrics {
    pub current_close: f64,
    pub sma50: f64,
    pub sma150: f64,
    pub sma200: f64,
    /// 200-bar average ending 20 trading days before the latest bar
    pub sma200_lagged: f64,
    pub low_52w: f64,
    pub high_52w: f64,
}

/// The six trend-template flags and their pass count
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConditionSet {
    pub cond_1: bool,
    pub cond_2: bool,
    pub cond_3: bool,
    pub cond_4: bool,
    pub cond_5: bool,
    pub cond_6: bool,
    pub pass_count: u8,
}

impl ConditionSet {
    pub const TOTAL: u8 = 6;

    pub fn flags(&self) -> [bool; 6] {
        [
            self.cond_1,
            self.cond_2,
            self.cond_3,
            self.cond_4,
            self.cond_5,
            self.cond_6,
        ]
    }

    pub fn all_passed(&self) -> bool {
        self.pass_count == Self::TOTAL
    }
}

/// Answer from the compliance collaborator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    Questionable,
    /// Lookup succeeded and the stock passed neither test
    NotCompliant,
    /// Lookup failed; says nothing about the stock
    Unknown,
}

impl ComplianceStatus {
    /// Label written to the report, `None` where the cell stays empty
    pub fn label(&self) -> Option<&'static str> {
        match self {
            ComplianceStatus::Compliant => Some("COMPLIANT"),
            ComplianceStatus::Questionable => Some("QUESTIONABLE"),
            ComplianceStatus::NotCompliant => Some("FAILED"),
            ComplianceStatus::Unknown => None,
        }
    }
}

/// A screened candidate: screener attributes plus computed conditions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreeningResult {
    pub candidate: CandidateRecord,
    pub metrics: TrendMetrics,
    pub conditions: ConditionSet,
    /// `None` until the compliance pass has looked at this ticker
    pub compliance: Option<ComplianceStatus>,
}

impl ScreeningResult {
    pub fn ticker(&self) -> &str {
        &self.candidate.ticker
    }

    pub fn pass_count(&self) -> u8 {
        self.conditions.pass_count
    }
}

/// Direction of a notification signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "BUY"),
            TradeAction::Sell => write!(f, "SELL"),
        }
    }
}

/// Structured buy/sell signal for the chat collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeSignal {
    pub action: TradeAction,
    pub ticker: String,
    pub price: f64,
}
