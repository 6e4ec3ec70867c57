use super::{MarketDataProvider, ProviderError};
use crate::models::PriceBar;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Market data held in memory, keyed by ticker
///
/// Used for offline runs and tests. Unknown tickers answer `NotFound`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    bars: HashMap<String, Vec<PriceBar>>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(mut self, ticker: impl Into<String>, bars: Vec<PriceBar>) -> Self {
        self.insert(ticker, bars);
        self
    }

    pub fn insert(&mut self, ticker: impl Into<String>, bars: Vec<PriceBar>) {
        self.bars.insert(ticker.into(), bars);
    }
}

#[async_trait]
impl MarketDataProvider for InMemoryProvider {
    async fn daily_bars(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        let bars = self
            .bars
            .get(ticker)
            .ok_or_else(|| ProviderError::NotFound(ticker.to_string()))?;

        Ok(bars
            .iter()
            .filter(|b| b.date >= start && b.date <= end)
            .cloned()
            .collect())
    }
}
