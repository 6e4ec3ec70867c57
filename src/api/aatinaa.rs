use crate::models::{ComplianceStatus, ScreeningResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const AATINAA_API_URL: &str = "https://api.aatinaa.co/graphql";

const STOCK_DETAIL_QUERY: &str = "query getStockDetail($ticker: String!) {
  getStockDetail(ticker: $ticker) {
    ticker
    interestBearingDebtStatus
    interestBearingSecuritiesStatus
    interestVsRevenueStatus
    redListStatus
    shariaCompliantStatus
  }
}";

const PASSED: &str = "PASSED";
const LOOKUP_TIMEOUT_SECS: u64 = 15;

/// Looks up the compliance status of a ticker.
///
/// Infallible by contract: lookup failures come back as
/// `ComplianceStatus::Unknown`.
#[async_trait]
pub trait ComplianceChecker: Send + Sync {
    async fn status(&self, ticker: &str) -> ComplianceStatus;
}

/// Client for the Aatinaa GraphQL API (Sharia screening)
#[derive(Clone)]
pub struct AatinaaClient {
    client: Client,
    url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphQlRequest {
    operation_name: &'static str,
    variables: serde_json::Value,
    query: &'static str,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<StockDetailData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StockDetailData {
    get_stock_detail: Option<StockDetail>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StockDetail {
    interest_bearing_debt_status: Option<String>,
    interest_bearing_securities_status: Option<String>,
    interest_vs_revenue_status: Option<String>,
    sharia_compliant_status: Option<String>,
}

impl StockDetail {
    fn classify(&self) -> ComplianceStatus {
        let passed = |field: &Option<String>| field.as_deref() == Some(PASSED);

        if passed(&self.sharia_compliant_status) {
            ComplianceStatus::Compliant
        } else if passed(&self.interest_bearing_debt_status)
            && passed(&self.interest_bearing_securities_status)
            && passed(&self.interest_vs_revenue_status)
        {
            ComplianceStatus::Questionable
        } else {
            ComplianceStatus::NotCompliant
        }
    }
}

impl AatinaaClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(LOOKUP_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn fetch_detail(&self, ticker: &str) -> crate::Result<StockDetail> {
        let request = GraphQlRequest {
            operation_name: "getStockDetail",
            variables: json!({ "ticker": ticker }),
            query: STOCK_DETAIL_QUERY,
        };

        let response = self.client.post(&self.url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(format!("Aatinaa API error: {}", response.status()).into());
        }

        let body: GraphQlResponse = response.json().await?;

        body.data
            .and_then(|d| d.get_stock_detail)
            .ok_or_else(|| format!("No stock detail returned for {}", ticker).into())
    }
}

#[async_trait]
impl ComplianceChecker for AatinaaClient {
    async fn status(&self, ticker: &str) -> ComplianceStatus {
        match self.fetch_detail(ticker).await {
            Ok(detail) => detail.classify(),
            Err(e) => {
                tracing::warn!(ticker = %ticker, "Compliance lookup failed: {}", e);
                ComplianceStatus::Unknown
            }
        }
    }
}

/// Attach a compliance status to every result that passed at least one
/// condition. Results with a zero pass count are left unchecked.
pub async fn annotate_compliance(results: &mut [ScreeningResult], checker: &dyn ComplianceChecker) {
    let mut checked = 0;

    for result in results.iter_mut().filter(|r| r.pass_count() > 0) {
        let status = checker.status(result.ticker()).await;
        tracing::debug!(ticker = %result.ticker(), status = ?status, "Compliance status");
        result.compliance = Some(status);
        checked += 1;
    }

    tracing::info!("Checked compliance for {} tickers", checked);
}
