// Technical indicators module
// Trailing moving averages and price ranges over daily closes

pub mod moving_average;
pub mod range;

pub use moving_average::{calculate_lagged_sma, calculate_sma};
pub use range::{trailing_high, trailing_low};

/// Round to two decimals, ties to even.
///
/// Applied to every derived metric before it takes part in a comparison.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
