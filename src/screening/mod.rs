// Trend-template screening: fetch, measure, evaluate

pub mod conditions;
pub mod fetcher;
pub mod metrics;
pub mod pipeline;

pub use conditions::{ABOVE_LOW_MULTIPLE, NEAR_HIGH_MULTIPLE};
pub use fetcher::{FetchError, FetchOutcome, PriceSeriesFetcher, RetryPolicy};
pub use metrics::{MetricsError, MIN_BARS};
pub use pipeline::{
    CancelHandle, PipelineOptions, ScreeningError, ScreeningPipeline, ScreeningRun, SkipReason,
    SkippedTicker,
};
