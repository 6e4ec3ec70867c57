use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use trendscreener::api::{InMemoryProvider, MarketDataProvider, ProviderError};
use trendscreener::models::{CandidateRecord, PriceBar};
use trendscreener::report::ResultTable;
use trendscreener::screening::{
    FetchError, PipelineOptions, PriceSeriesFetcher, RetryPolicy, ScreeningPipeline, SkipReason,
};
use trendscreener::synthetic::linear_bars;

/// In-memory data, except one ticker that is always rate limited
struct ThrottledProvider {
    inner: InMemoryProvider,
    throttled: &'static str,
    throttled_calls: AtomicU32,
}

#[async_trait]
impl MarketDataProvider for ThrottledProvider {
    async fn daily_bars(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        if ticker == self.throttled {
            self.throttled_calls.fetch_add(1, Ordering::SeqCst);
            return Err(ProviderError::RateLimited("429 Too Many Requests".to_string()));
        }
        self.inner.daily_bars(ticker, start, end).await
    }
}

fn end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()
}

fn pipeline<P: MarketDataProvider>(provider: P, max_concurrency: usize) -> ScreeningPipeline<P> {
    ScreeningPipeline::new(
        PriceSeriesFetcher::new(provider, RetryPolicy::immediate(3), 50),
        PipelineOptions {
            max_concurrency,
            request_pause: Duration::ZERO,
            ..PipelineOptions::default()
        },
    )
}

fn candidates(tickers: &[&str]) -> Vec<CandidateRecord> {
    tickers.iter().map(|t| CandidateRecord::new(*t)).collect()
}

#[tokio::test]
async fn test_linear_uptrend_meets_every_condition() {
    let data = InMemoryProvider::new().with_bars("AAA", linear_bars(end(), 260, 100.0, 200.0));
    let run = pipeline(data, 1)
        .run_until(candidates(&["AAA"]), end())
        .await
        .unwrap();

    assert_eq!(run.results.len(), 1);
    let result = &run.results[0];
    assert_eq!(result.ticker(), "AAA");
    assert_eq!(result.metrics.current_close, 200.0);
    assert_eq!(result.metrics.high_52w, 200.0);
    assert!(result.metrics.sma50 > result.metrics.sma150);
    assert!(result.metrics.sma150 > result.metrics.sma200);
    assert!(result.metrics.sma200 > result.metrics.sma200_lagged);
    assert_eq!(result.pass_count(), 6);
    assert!(result.conditions.all_passed());
    assert_eq!(run.passed_all().count(), 1);
}

#[tokio::test]
async fn test_rate_limited_ticker_is_skipped_after_retries() {
    let provider = ThrottledProvider {
        inner: InMemoryProvider::new().with_bars("AAA", linear_bars(end(), 260, 100.0, 200.0)),
        throttled: "BBB",
        throttled_calls: AtomicU32::new(0),
    };
    let p = pipeline(provider, 1);

    let run = p
        .run_until(candidates(&["BBB", "AAA"]), end())
        .await
        .unwrap();

    assert_eq!(run.results.len(), 1);
    assert_eq!(run.results[0].ticker(), "AAA");
    assert_eq!(p.fetcher().provider().throttled_calls.load(Ordering::SeqCst), 3);

    assert_eq!(run.skipped.len(), 1);
    assert_eq!(run.skipped[0].ticker, "BBB");
    match &run.skipped[0].reason {
        SkipReason::Fetch(FetchError::Exhausted {
            attempts,
            last_error,
            ..
        }) => {
            assert_eq!(*attempts, 3);
            assert!(matches!(last_error, ProviderError::RateLimited(_)));
        }
        other => panic!("expected exhausted retries, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failure_in_middle_keeps_order() {
    let data = InMemoryProvider::new()
        .with_bars("A", linear_bars(end(), 260, 100.0, 200.0))
        .with_bars("C", linear_bars(end(), 260, 200.0, 100.0));

    let run = pipeline(data, 3)
        .run_until(candidates(&["A", "B", "C"]), end())
        .await
        .unwrap();

    let tickers: Vec<&str> = run.results.iter().map(|r| r.ticker()).collect();
    assert_eq!(tickers, vec!["A", "C"]);
    assert!(matches!(
        run.skipped[0].reason,
        SkipReason::Fetch(FetchError::TickerUnknown(_))
    ));

    // downtrend: price under every average, far from the high
    assert!(!run.results[1].conditions.cond_1);
    assert!(!run.results[1].conditions.cond_6);
}

#[tokio::test]
async fn test_short_history_is_skipped() {
    let data = InMemoryProvider::new()
        .with_bars("NEW", linear_bars(end(), 49, 10.0, 20.0))
        .with_bars("OLD", linear_bars(end(), 260, 10.0, 20.0));

    let run = pipeline(data, 1)
        .run_until(candidates(&["NEW", "OLD"]), end())
        .await
        .unwrap();

    assert_eq!(run.results.len(), 1);
    assert!(matches!(
        run.skipped[0].reason,
        SkipReason::InsufficientData { bars: 49 }
    ));
}

#[tokio::test]
async fn test_runs_are_deterministic() {
    let data = InMemoryProvider::new()
        .with_bars("A", linear_bars(end(), 300, 50.0, 80.0))
        .with_bars("B", linear_bars(end(), 120, 80.0, 60.0));
    let p = pipeline(data, 2);

    let first = p.run_until(candidates(&["A", "B"]), end()).await.unwrap();
    let second = p.run_until(candidates(&["A", "B"]), end()).await.unwrap();

    assert_eq!(first.results, second.results);
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn test_report_lists_run_results() {
    let data = InMemoryProvider::new()
        .with_bars("AAA", linear_bars(end(), 260, 100.0, 200.0))
        .with_bars("ZZZ", linear_bars(end(), 260, 200.0, 100.0));

    let run = pipeline(data, 1)
        .run_until(candidates(&["AAA", "ZZZ"]), end())
        .await
        .unwrap();
    let table = ResultTable::build(&run.results, chrono::Utc::now(), chrono_tz::UTC);

    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.visible_rows().count(), 1);
}
