use crate::models::{AttributeValue, CandidateRecord};
use crate::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::path::PathBuf;

/// Supplies the ordered candidate list for a run
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn candidates(&self) -> Result<Vec<CandidateRecord>>;
}

/// Candidates exported from the screener as a JSON array of row objects
///
/// Row order is kept. Rows without a ticker are skipped with a warning.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CandidateSource for JsonFileSource {
    async fn candidates(&self) -> Result<Vec<CandidateRecord>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| format!("Failed to read {}: {}", self.path.display(), e))?;

        let rows: Vec<IndexMap<String, AttributeValue>> = serde_json::from_str(&raw)
            .map_err(|e| format!("Failed to parse {}: {}", self.path.display(), e))?;

        let total = rows.len();
        let candidates: Vec<CandidateRecord> = rows
            .into_iter()
            .enumerate()
            .filter_map(|(i, row)| {
                let candidate = CandidateRecord::from_attributes(row);
                if candidate.is_none() {
                    tracing::warn!(row = i, "Skipping screener row without a ticker");
                }
                candidate
            })
            .collect();

        tracing::info!(
            "Loaded {} candidates from {} ({} rows)",
            candidates.len(),
            self.path.display(),
            total
        );

        Ok(candidates)
    }
}

/// Fixed candidate list
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    candidates: Vec<CandidateRecord>,
}

impl StaticSource {
    pub fn new(candidates: Vec<CandidateRecord>) -> Self {
        Self { candidates }
    }

    pub fn from_tickers(tickers: &[&str]) -> Self {
        Self::new(tickers.iter().map(|t| CandidateRecord::new(*t)).collect())
    }
}

#[async_trait]
impl CandidateSource for StaticSource {
    async fn candidates(&self) -> Result<Vec<CandidateRecord>> {
        Ok(self.candidates.clone())
    }
}
