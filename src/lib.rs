// Core modules
pub mod api;
pub mod config;
pub mod indicators;
pub mod models;
pub mod report;
pub mod screening;
pub mod synthetic;

// Re-export commonly used types
pub use api::*;
pub use models::*;
pub use screening::{
    CancelHandle, FetchError, FetchOutcome, PipelineOptions, PriceSeriesFetcher, RetryPolicy,
    ScreeningError, ScreeningPipeline, ScreeningRun, SkipReason,
};

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
