use super::{MarketDataProvider, ProviderError};
use crate::config::FetchSettings;
use crate::models::PriceBar;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use governor::{Quota, RateLimiter};
use indexmap::IndexMap;
use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;

const BARS_PATH: &str = "/v2/stocks/bars";
const PAGE_LIMIT: u32 = 10_000;

// Type alias for the rate limiter to simplify signatures
type AlpacaRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Client for the Alpaca market data API (daily stock bars)
///
/// Cloneable; all clones share one rate limiter, which caps the request rate
/// for the whole process no matter how many tickers are in flight.
#[derive(Clone)]
pub struct AlpacaClient {
    client: Client,
    base_url: String,
    feed: String,
    rate_limiter: Arc<AlpacaRateLimiter>,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct AlpacaBar {
    #[serde(rename = "t")]
    timestamp: DateTime<Utc>,
    #[serde(rename = "o")]
    open: f64,
    #[serde(rename = "h")]
    high: f64,
    #[serde(rename = "l")]
    low: f64,
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "v")]
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct BarsResponse {
    #[serde(default)]
    bars: Option<IndexMap<String, Vec<AlpacaBar>>>,
    next_page_token: Option<String>,
}

impl From<AlpacaBar> for PriceBar {
    fn from(bar: AlpacaBar) -> Self {
        PriceBar {
            date: bar.timestamp.date_naive(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        }
    }
}

// ============== Implementation ==============

impl AlpacaClient {
    pub fn new(
        settings: &FetchSettings,
        api_key: &SecretString,
        secret_key: &SecretString,
    ) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            "APCA-API-KEY-ID",
            header::HeaderValue::from_str(api_key.expose_secret())
                .context("Alpaca API key is not a valid header value")?,
        );
        headers.insert(
            "APCA-API-SECRET-KEY",
            header::HeaderValue::from_str(secret_key.expose_secret())
                .context("Alpaca secret key is not a valid header value")?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let rpm = NonZeroU32::new(settings.requests_per_minute)
            .context("fetch.requests_per_minute must be greater than zero")?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            feed: settings.feed.clone(),
            rate_limiter,
        })
    }

    fn query(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
        page_token: Option<&str>,
    ) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("symbols", ticker.to_string()),
            ("timeframe", "1Day".to_string()),
            ("start", start.format("%Y-%m-%d").to_string()),
            ("end", end.format("%Y-%m-%d").to_string()),
            // Literal close throughout, never split/dividend adjusted
            ("adjustment", "raw".to_string()),
            ("feed", self.feed.clone()),
            ("limit", PAGE_LIMIT.to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("page_token", token.to_string()));
        }
        query
    }

    /// Fetch one page of bars
    async fn fetch_page(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
        page_token: Option<&str>,
    ) -> Result<BarsResponse, ProviderError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, BARS_PATH);
        let response = self
            .client
            .get(&url)
            .query(&self.query(ticker, start, end, page_token))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MarketDataProvider for AlpacaClient {
    async fn daily_bars(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        let mut bars: Vec<PriceBar> = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .fetch_page(ticker, start, end, page_token.as_deref())
                .await?;

            // Keyed by symbol; keep only the ticker we asked for
            if let Some(mut by_symbol) = page.bars {
                if let Some(ticker_bars) = by_symbol.shift_remove(ticker) {
                    bars.extend(ticker_bars.into_iter().map(PriceBar::from));
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!(ticker = %ticker, bars = bars.len(), "Fetched daily bars from Alpaca");

        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings(base_url: &str) -> FetchSettings {
        FetchSettings {
            base_url: base_url.to_string(),
            ..FetchSettings::default()
        }
    }

    fn keys() -> (SecretString, SecretString) {
        (
            SecretString::from("key-id".to_string()),
            SecretString::from("secret".to_string()),
        )
    }

    #[test]
    fn test_client_creation() {
        let (key, secret) = keys();
        let client = AlpacaClient::new(&test_settings("https://example.com/"), &key, &secret);
        assert!(client.is_ok());
        assert_eq!(client.unwrap().base_url, "https://example.com");
    }

    #[test]
    fn test_zero_rate_rejected() {
        let (key, secret) = keys();
        let settings = FetchSettings {
            requests_per_minute: 0,
            ..FetchSettings::default()
        };
        assert!(AlpacaClient::new(&settings, &key, &secret).is_err());
    }

    #[test]
    fn test_query_uses_raw_daily_bars() {
        let (key, secret) = keys();
        let client = AlpacaClient::new(&test_settings("https://example.com"), &key, &secret).unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 2, 4).unwrap();

        let query = client.query("AAPL", start, end, Some("abc"));

        assert!(query.contains(&("timeframe", "1Day".to_string())));
        assert!(query.contains(&("adjustment", "raw".to_string())));
        assert!(query.contains(&("start", "2024-01-01".to_string())));
        assert!(query.contains(&("end", "2025-02-04".to_string())));
        assert!(query.contains(&("page_token", "abc".to_string())));
    }

    #[test]
    fn test_decode_null_bars() {
        let page: BarsResponse =
            serde_json::from_str(r#"{"bars": null, "next_page_token": null}"#).unwrap();
        assert!(page.bars.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires ALPACA_API_KEY / ALPACA_SECRET_KEY and network
    async fn test_daily_bars_live() {
        let key = std::env::var("ALPACA_API_KEY").expect("ALPACA_API_KEY not set");
        let secret = std::env::var("ALPACA_SECRET_KEY").expect("ALPACA_SECRET_KEY not set");
        let client = AlpacaClient::new(
            &FetchSettings::default(),
            &SecretString::from(key),
            &SecretString::from(secret),
        )
        .unwrap();

        let end = Utc::now().date_naive();
        let start = end - chrono::Duration::days(400);
        let bars = client.daily_bars("AAPL", start, end).await.unwrap();

        assert!(bars.len() > 200, "Expected >200 daily bars, got {}", bars.len());
    }
}
