use crate::api::{MarketDataProvider, ProviderError};
use crate::config::FetchSettings;
use crate::models::PriceSeries;
use chrono::NaiveDate;
use std::time::Duration;
use thiserror::Error;

/// Bounded retry with linear backoff.
///
/// The delay before retry `n` (1-based attempt that just failed) is the
/// base delay for the failure class times `n`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub rate_limit_backoff: Duration,
    pub transient_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_backoff: Duration::from_secs(1),
            transient_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            rate_limit_backoff: Duration::ZERO,
            transient_backoff: Duration::ZERO,
        }
    }

    pub fn delay_for(&self, error: &ProviderError, attempt: u32) -> Duration {
        let base = match error {
            ProviderError::RateLimited(_) => self.rate_limit_backoff,
            _ => self.transient_backoff,
        };
        base * attempt
    }
}

impl From<&FetchSettings> for RetryPolicy {
    fn from(settings: &FetchSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            rate_limit_backoff: Duration::from_millis(settings.rate_limit_backoff_ms),
            transient_backoff: Duration::from_millis(settings.transient_backoff_ms),
        }
    }
}

/// Successful fetch
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Series(PriceSeries),
    /// Data came back but too little of it to evaluate
    InsufficientData { bars: usize },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Terminal; never retried
    #[error("ticker {0} is unknown to the data provider")]
    TickerUnknown(String),

    #[error("failed to get data for {ticker} after {attempts} attempts: {last_error}")]
    Exhausted {
        ticker: String,
        attempts: u32,
        #[source]
        last_error: ProviderError,
    },
}

/// Fetches a validated daily series for one ticker
pub struct PriceSeriesFetcher<P> {
    provider: P,
    policy: RetryPolicy,
    min_bars: usize,
}

impl<P: MarketDataProvider> PriceSeriesFetcher<P> {
    pub fn new(provider: P, policy: RetryPolicy, min_bars: usize) -> Self {
        Self {
            provider,
            policy,
            min_bars,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Fetch `ticker` over `[start, end]`.
    ///
    /// Rate limits and transport failures are retried up to
    /// `max_attempts`; an unknown ticker fails at once. A short series is
    /// `InsufficientData`, not an error.
    pub async fn fetch(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchOutcome, FetchError> {
        if ticker.trim().is_empty() {
            return Err(FetchError::InvalidRequest("empty ticker".to_string()));
        }
        if end <= start {
            return Err(FetchError::InvalidRequest(format!(
                "window end {} is not after start {}",
                end, start
            )));
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            tracing::debug!(ticker = %ticker, attempt, "Fetching daily bars");

            let error = match self.provider.daily_bars(ticker, start, end).await {
                Ok(bars) => return Ok(self.validate(ticker, bars)),
                Err(ProviderError::NotFound(msg)) => {
                    tracing::warn!(ticker = %ticker, "Ticker not found upstream: {}", msg);
                    return Err(FetchError::TickerUnknown(ticker.to_string()));
                }
                Err(e) => e,
            };

            if attempt >= max_attempts {
                tracing::warn!(
                    ticker = %ticker,
                    "Failed to get data after {} attempts: {}",
                    attempt,
                    error
                );
                return Err(FetchError::Exhausted {
                    ticker: ticker.to_string(),
                    attempts: attempt,
                    last_error: error,
                });
            }

            let delay = self.policy.delay_for(&error, attempt);
            tracing::warn!(
                ticker = %ticker,
                "Attempt {}/{} failed: {}, retrying in {:?}",
                attempt,
                max_attempts,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn validate(&self, ticker: &str, bars: Vec<crate::models::PriceBar>) -> FetchOutcome {
        let series = PriceSeries::new(ticker, bars);

        if series.len() < self.min_bars {
            tracing::warn!(
                ticker = %ticker,
                "Insufficient data ({} days, need {})",
                series.len(),
                self.min_bars
            );
            return FetchOutcome::InsufficientData { bars: series.len() };
        }

        tracing::info!(ticker = %ticker, "Got data ({} days)", series.len());
        FetchOutcome::Series(series)
    }
}
