/// Calculate Simple Moving Average (SMA) over the trailing `period` prices.
///
/// With fewer than `period` prices the mean covers all of them. Returns
/// `None` for an empty slice or a zero period.
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if prices.is_empty() || period == 0 {
        return None;
    }

    let take = period.min(prices.len());
    let sum: f64 = prices.iter().rev().take(take).sum();
    Some(sum / take as f64)
}

/// SMA over the `period` prices that end `lag` prices before the latest one.
///
/// Covers indices `[len - lag - period, len - lag)`, with the start clamped to
/// the beginning of history. Returns `None` when the window is empty.
pub fn calculate_lagged_sma(prices: &[f64], period: usize, lag: usize) -> Option<f64> {
    let end = prices.len().checked_sub(lag)?;
    let start = end.saturating_sub(period);
    let window = &prices[start..end];

    if window.is_empty() {
        return None;
    }

    Some(window.iter().sum::<f64>() / window.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        let sma = calculate_sma(&prices, 5);
        assert_eq!(sma, Some(104.0));
    }

    #[test]
    fn test_sma_uses_trailing_window() {
        let prices = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(calculate_sma(&prices, 2), Some(4.5));
    }

    #[test]
    fn test_sma_short_history_uses_all_prices() {
        let prices = vec![100.0, 102.0];
        assert_eq!(calculate_sma(&prices, 5), Some(101.0));
    }

    #[test]
    fn test_sma_empty() {
        assert!(calculate_sma(&[], 5).is_none());
        assert!(calculate_sma(&[1.0], 0).is_none());
    }

    #[test]
    fn test_lagged_sma_window() {
        let prices: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        // indices [5, 8) -> 6, 7, 8
        assert_eq!(calculate_lagged_sma(&prices, 3, 2), Some(7.0));
    }

    #[test]
    fn test_lagged_sma_clamps_at_start() {
        let prices: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        // indices [0, 4) -> 1..=4
        assert_eq!(calculate_lagged_sma(&prices, 200, 6), Some(2.5));
    }

    #[test]
    fn test_lagged_sma_empty_window() {
        let prices = vec![1.0, 2.0, 3.0];
        assert!(calculate_lagged_sma(&prices, 200, 3).is_none());
        assert!(calculate_lagged_sma(&prices, 200, 20).is_none());
    }
}
