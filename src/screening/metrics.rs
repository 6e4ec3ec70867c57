use crate::indicators::{calculate_lagged_sma, calculate_sma, round_cents, trailing_high, trailing_low};
use crate::models::{PriceSeries, TrendMetrics};
use thiserror::Error;

/// Shortest history a series needs before metrics are meaningful
pub const MIN_BARS: usize = 50;

pub const SMA_SHORT: usize = 50;
pub const SMA_MEDIUM: usize = 150;
pub const SMA_LONG: usize = 200;
/// Trading days between the current and the lagged 200-bar average
pub const SMA_LONG_LAG: usize = 20;
/// Trading days standing in for 52 weeks
pub const YEAR_BARS: usize = 255;

#[derive(Debug, Error, PartialEq)]
pub enum MetricsError {
    #[error("insufficient history: {bars} bars, need at least {required}")]
    InsufficientHistory { bars: usize, required: usize },
}

impl TrendMetrics {
    /// Derive trend metrics from a daily series.
    ///
    /// All statistics use the literal close. Averages and extremes are
    /// rounded to cents before they are returned; `current_close` is kept
    /// as fetched. Fails only for a series shorter than [`MIN_BARS`].
    pub fn compute(series: &PriceSeries) -> Result<Self, MetricsError> {
        let insufficient = || MetricsError::InsufficientHistory {
            bars: series.len(),
            required: MIN_BARS,
        };

        if series.len() < MIN_BARS {
            return Err(insufficient());
        }

        let closes = series.closes();
        let current_close = *closes.last().ok_or_else(insufficient)?;

        let sma = |period| calculate_sma(&closes, period).map(round_cents).ok_or_else(insufficient);

        let metrics = TrendMetrics {
            current_close,
            sma50: sma(SMA_SHORT)?,
            sma150: sma(SMA_MEDIUM)?,
            sma200: sma(SMA_LONG)?,
            sma200_lagged: calculate_lagged_sma(&closes, SMA_LONG, SMA_LONG_LAG)
                .map(round_cents)
                .ok_or_else(insufficient)?,
            low_52w: trailing_low(&closes, YEAR_BARS)
                .map(round_cents)
                .ok_or_else(insufficient)?,
            high_52w: trailing_high(&closes, YEAR_BARS)
                .map(round_cents)
                .ok_or_else(insufficient)?,
        };

        tracing::debug!(ticker = %series.ticker(), metrics = ?metrics, "Computed trend metrics");

        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::linear_bars;
    use chrono::NaiveDate;

    fn end() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()
    }

    fn series_from(closes: &[f64]) -> PriceSeries {
        let mut bars = linear_bars(end(), closes.len(), 1.0, 1.0);
        for (bar, close) in bars.iter_mut().zip(closes) {
            bar.close = *close;
        }
        PriceSeries::new("TEST", bars)
    }

    #[test]
    fn test_rejects_short_series() {
        let series = series_from(&[10.0; 49]);
        assert_eq!(
            TrendMetrics::compute(&series),
            Err(MetricsError::InsufficientHistory { bars: 49, required: 50 })
        );
    }

    #[test]
    fn test_flat_series() {
        let series = series_from(&[42.0; 300]);
        let m = TrendMetrics::compute(&series).unwrap();

        assert_eq!(m.current_close, 42.0);
        assert_eq!(m.sma50, 42.0);
        assert_eq!(m.sma200, 42.0);
        assert_eq!(m.sma200_lagged, 42.0);
        assert_eq!(m.low_52w, 42.0);
        assert_eq!(m.high_52w, 42.0);
    }

    #[test]
    fn test_windows_on_counting_series() {
        // closes 1, 2, ..., 300
        let closes: Vec<f64> = (1..=300).map(|v| v as f64).collect();
        let m = TrendMetrics::compute(&series_from(&closes)).unwrap();

        assert_eq!(m.current_close, 300.0);
        assert_eq!(m.sma50, 275.5); // 251..=300
        assert_eq!(m.sma150, 225.5); // 151..=300
        assert_eq!(m.sma200, 200.5); // 101..=300
        assert_eq!(m.sma200_lagged, 180.5); // 81..=280
        assert_eq!(m.low_52w, 46.0); // 46..=300
        assert_eq!(m.high_52w, 300.0);
    }

    #[test]
    fn test_short_history_clamps_windows() {
        // 60 bars: every long window covers what exists
        let closes: Vec<f64> = (1..=60).map(|v| v as f64).collect();
        let m = TrendMetrics::compute(&series_from(&closes)).unwrap();

        assert_eq!(m.sma50, 35.5); // 11..=60
        assert_eq!(m.sma150, 30.5); // 1..=60
        assert_eq!(m.sma200, 30.5);
        assert_eq!(m.sma200_lagged, 20.5); // 1..=40
        assert_eq!(m.low_52w, 1.0);
        assert_eq!(m.high_52w, 60.0);
    }

    #[test]
    fn test_derived_values_rounded_close_is_not() {
        let mut closes = vec![10.0; 99];
        closes.push(10.333);
        let m = TrendMetrics::compute(&series_from(&closes)).unwrap();

        assert_eq!(m.current_close, 10.333);
        // (49 * 10 + 10.333) / 50 = 10.00666
        assert_eq!(m.sma50, 10.01);
        assert_eq!(m.high_52w, 10.33);
    }
}
