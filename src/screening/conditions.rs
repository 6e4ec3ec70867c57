use crate::models::{ConditionSet, TrendMetrics};

/// Minimum distance above the 52-week low, as a multiple of it
pub const ABOVE_LOW_MULTIPLE: f64 = 1.30;
/// Maximum distance below the 52-week high, as a multiple of it
pub const NEAR_HIGH_MULTIPLE: f64 = 0.75;

impl ConditionSet {
    /// Evaluate the six trend-template conditions.
    ///
    /// 1. close > SMA150 > SMA200
    /// 2. SMA200 rising versus 20 trading days ago
    /// 3. SMA50 > SMA150 > SMA200
    /// 4. close > SMA50
    /// 5. close at least 30% above the 52-week low (inclusive)
    /// 6. close within 25% of the 52-week high (inclusive)
    ///
    /// Every condition is evaluated on its own; none short-circuits another.
    pub fn evaluate(m: &TrendMetrics) -> Self {
        let cond_1 = m.current_close > m.sma150 && m.sma150 > m.sma200;
        let cond_2 = m.sma200 > m.sma200_lagged;
        let cond_3 = m.sma50 > m.sma150 && m.sma150 > m.sma200;
        let cond_4 = m.current_close > m.sma50;
        let cond_5 = m.current_close >= ABOVE_LOW_MULTIPLE * m.low_52w;
        let cond_6 = m.current_close >= NEAR_HIGH_MULTIPLE * m.high_52w;

        let pass_count = [cond_1, cond_2, cond_3, cond_4, cond_5, cond_6]
            .iter()
            .filter(|c| **c)
            .count() as u8;

        ConditionSet {
            cond_1,
            cond_2,
            cond_3,
            cond_4,
            cond_5,
            cond_6,
            pass_count,
        }
    }
}
