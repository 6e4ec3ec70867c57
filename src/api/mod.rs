// External API clients
// Market data, screener candidates, compliance lookups and chat notifications

pub mod aatinaa;
pub mod alpaca;
pub mod memory;
pub mod screener;
pub mod telegram;

pub use aatinaa::{annotate_compliance, AatinaaClient, ComplianceChecker};
pub use alpaca::AlpacaClient;
pub use memory::InMemoryProvider;
pub use screener::{CandidateSource, JsonFileSource, StaticSource};
pub use telegram::TelegramNotifier;

use crate::models::PriceBar;
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

/// Failure classes reported by a market-data collaborator
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The symbol does not exist upstream
    #[error("ticker not found: {0}")]
    NotFound(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Classify a non-success HTTP answer
    pub fn from_status(status: u16, body: String) -> Self {
        let lower = body.to_lowercase();
        if status == 404 || lower.contains("not found") {
            ProviderError::NotFound(body)
        } else if status == 429 || lower.contains("rate limit") {
            ProviderError::RateLimited(body)
        } else {
            ProviderError::Api { status, body }
        }
    }
}

/// Source of daily price bars
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Daily bars for `ticker` between `start` and `end` inclusive.
    ///
    /// Only the requested ticker's bars are returned, in any order.
    async fn daily_bars(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, ProviderError>;
}
