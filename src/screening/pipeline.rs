use super::fetcher::{FetchError, FetchOutcome, PriceSeriesFetcher};
use super::metrics::MetricsError;
use crate::api::MarketDataProvider;
use crate::config::{FetchSettings, PipelineSettings};
use crate::models::{CandidateRecord, ConditionSet, ScreeningResult, TrendMetrics};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Requests a running pipeline to stop admitting tickers
///
/// Tickers already in flight finish; none is reported half-done.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Record an interrupt. The first one cancels; returns true when a stop
    /// had already been requested, i.e. the caller should give up waiting.
    pub fn interrupt(&self) -> bool {
        self.0.swap(true, Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Calendar days of history requested per ticker
    pub lookback_days: i64,
    /// Upper bound on tickers fetched at once
    pub max_concurrency: usize,
    /// Pause between admitting one ticker and the next
    pub request_pause: Duration,
    pub max_tickers: Option<usize>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_settings(&FetchSettings::default(), &PipelineSettings::default())
    }
}

impl PipelineOptions {
    pub fn from_settings(fetch: &FetchSettings, pipeline: &PipelineSettings) -> Self {
        Self {
            lookback_days: fetch.lookback_days,
            max_concurrency: pipeline.max_concurrency,
            request_pause: pipeline.request_pause(),
            max_tickers: pipeline.max_tickers,
        }
    }
}

#[derive(Debug, Error)]
pub enum SkipReason {
    #[error("insufficient data ({bars} bars)")]
    InsufficientData { bars: usize },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

#[derive(Debug)]
pub struct SkippedTicker {
    pub ticker: String,
    pub reason: SkipReason,
}

/// Everything one pipeline run produced
#[derive(Debug)]
pub struct ScreeningRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Screened tickers in candidate order
    pub results: Vec<ScreeningResult>,
    pub skipped: Vec<SkippedTicker>,
    /// True when a stop request left candidates unprocessed
    pub cancelled: bool,
}

impl ScreeningRun {
    pub fn passed_all(&self) -> impl Iterator<Item = &ScreeningResult> {
        self.results.iter().filter(|r| r.conditions.all_passed())
    }
}

#[derive(Debug, Error)]
pub enum ScreeningError {
    #[error("no candidates to screen")]
    NoCandidates,

    #[error("none of the {candidates} candidates could be processed")]
    NothingProcessed {
        candidates: usize,
        skipped: Vec<SkippedTicker>,
    },
}

enum TickerOutcome {
    Screened(ScreeningResult),
    Skipped(SkippedTicker),
}

/// Fetch, measure and evaluate every candidate in order
pub struct ScreeningPipeline<P> {
    fetcher: PriceSeriesFetcher<P>,
    options: PipelineOptions,
    cancel: CancelHandle,
}

impl<P: MarketDataProvider> ScreeningPipeline<P> {
    pub fn new(fetcher: PriceSeriesFetcher<P>, options: PipelineOptions) -> Self {
        Self {
            fetcher,
            options,
            cancel: CancelHandle::new(),
        }
    }

    /// Share an existing handle, e.g. one already wired to a signal
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn fetcher(&self) -> &PriceSeriesFetcher<P> {
        &self.fetcher
    }

    /// Screen `candidates` with history ending today (UTC)
    pub async fn run(
        &self,
        candidates: Vec<CandidateRecord>,
    ) -> Result<ScreeningRun, ScreeningError> {
        self.run_until(candidates, Utc::now().date_naive()).await
    }

    /// Screen `candidates` with history ending at `end`.
    ///
    /// Results keep candidate order even when fetches overlap. One ticker's
    /// failure never affects another; the run only fails when there was
    /// nothing to screen or nothing could be screened.
    pub async fn run_until(
        &self,
        mut candidates: Vec<CandidateRecord>,
        end: NaiveDate,
    ) -> Result<ScreeningRun, ScreeningError> {
        if candidates.is_empty() {
            return Err(ScreeningError::NoCandidates);
        }

        let found = candidates.len();
        if let Some(max) = self.options.max_tickers {
            candidates.truncate(max);
        }
        let total = candidates.len();
        tracing::info!("Processing {} stocks (out of {} total)", total, found);

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = end - ChronoDuration::days(self.options.lookback_days);

        // The pause spaces admissions, so it holds with any concurrency
        let pause = self.options.request_pause;
        let outcomes: Vec<TickerOutcome> = stream::iter(candidates.into_iter().enumerate())
            .then(|(index, candidate)| async move {
                if index > 0 && !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
                (index, candidate)
            })
            .take_while(|_| futures::future::ready(!self.cancel.is_cancelled()))
            .map(|(index, candidate)| self.process(index, total, candidate, start, end))
            .buffered(self.options.max_concurrency.max(1))
            .collect()
            .await;

        let attempted = outcomes.len();
        let mut results = Vec::new();
        let mut skipped = Vec::new();
        for outcome in outcomes {
            match outcome {
                TickerOutcome::Screened(result) => results.push(result),
                TickerOutcome::Skipped(skip) => skipped.push(skip),
            }
        }

        let cancelled = attempted < total;
        if cancelled {
            tracing::warn!("Run cancelled after {}/{} tickers", attempted, total);
        }

        if results.is_empty() && !cancelled {
            tracing::error!("No stocks were successfully processed");
            return Err(ScreeningError::NothingProcessed {
                candidates: total,
                skipped,
            });
        }

        tracing::info!(
            run_id = %run_id,
            "Successfully processed {} stocks ({} skipped)",
            results.len(),
            skipped.len()
        );

        Ok(ScreeningRun {
            run_id,
            started_at,
            results,
            skipped,
            cancelled,
        })
    }

    async fn process(
        &self,
        index: usize,
        total: usize,
        candidate: CandidateRecord,
        start: NaiveDate,
        end: NaiveDate,
    ) -> TickerOutcome {
        let ticker = candidate.ticker.clone();
        tracing::info!("Processing {}... ({}/{})", ticker, index + 1, total);

        let skip = |reason: SkipReason| {
            tracing::warn!(ticker = %ticker, "Skipping: {}", reason);
            TickerOutcome::Skipped(SkippedTicker {
                ticker: ticker.clone(),
                reason,
            })
        };

        let series = match self.fetcher.fetch(&ticker, start, end).await {
            Ok(FetchOutcome::Series(series)) => series,
            Ok(FetchOutcome::InsufficientData { bars }) => {
                return skip(SkipReason::InsufficientData { bars })
            }
            Err(e) => return skip(e.into()),
        };

        let metrics = match TrendMetrics::compute(&series) {
            Ok(metrics) => metrics,
            Err(e) => return skip(e.into()),
        };
        let conditions = ConditionSet::evaluate(&metrics);

        tracing::info!(
            ticker = %ticker,
            pass_count = conditions.pass_count,
            "Successfully processed"
        );

        TickerOutcome::Screened(ScreeningResult {
            candidate,
            metrics,
            conditions,
            compliance: None,
        })
    }
}
