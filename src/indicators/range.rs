// 52-week style extremes over trailing closes

/// Highest price over the trailing `window` prices (all prices if fewer)
pub fn trailing_high(prices: &[f64], window: usize) -> Option<f64> {
    trailing(prices, window).reduce(f64::max)
}

/// Lowest price over the trailing `window` prices (all prices if fewer)
pub fn trailing_low(prices: &[f64], window: usize) -> Option<f64> {
    trailing(prices, window).reduce(f64::min)
}

fn trailing(prices: &[f64], window: usize) -> impl Iterator<Item = f64> + '_ {
    let start = prices.len().saturating_sub(window);
    prices[start..].iter().copied()
}
