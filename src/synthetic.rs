use crate::models::PriceBar;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Market scenario types for synthetic daily series
#[derive(Debug, Clone, Copy)]
pub enum MarketScenario {
    /// Steady uptrend with noise (+0.3% daily average)
    Uptrend,
    /// Steady downtrend with noise (-0.3% daily average)
    Downtrend,
    /// Sideways/choppy market (±1% around mean)
    Sideways,
}

/// `n` weekdays ending at `end` (or the weekday before it), oldest first
pub fn trading_days(end: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(n);
    let mut day = end;

    while days.len() < n {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(day);
        }
        day -= Duration::days(1);
    }

    days.reverse();
    days
}

/// `n` daily bars ending at `end` whose close moves linearly from `from` to `to`
pub fn linear_bars(end: NaiveDate, n: usize, from: f64, to: f64) -> Vec<PriceBar> {
    let step = if n > 1 { (to - from) / (n - 1) as f64 } else { 0.0 };

    trading_days(end, n)
        .into_iter()
        .enumerate()
        .map(|(i, date)| {
            let close = from + step * i as f64;
            PriceBar {
                date,
                open: close,
                high: close,
                low: close,
                close,
                volume: 1_000_000.0,
            }
        })
        .collect()
}

/// Generates seeded random daily bars
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
    base_volume: f64,
}

impl SyntheticDataGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 150.0,
            base_volume: 2_000_000.0,
        }
    }

    /// Generate `num_bars` daily bars ending at `end`
    pub fn generate(
        &mut self,
        scenario: MarketScenario,
        num_bars: usize,
        end: NaiveDate,
    ) -> Vec<PriceBar> {
        let mut current_price = self.base_price;
        let mean_price = self.base_price;

        trading_days(end, num_bars)
            .into_iter()
            .map(|date| {
                current_price += match scenario {
                    MarketScenario::Uptrend => {
                        current_price * (0.003 + self.rng.gen_range(-0.002..0.002))
                    }
                    MarketScenario::Downtrend => {
                        current_price * (-0.003 + self.rng.gen_range(-0.002..0.002))
                    }
                    MarketScenario::Sideways => {
                        (mean_price - current_price) * 0.1
                            + current_price * self.rng.gen_range(-0.01..0.01)
                    }
                };
                self.create_bar(current_price, date)
            })
            .collect()
    }

    /// Helper to create a bar from a close and a date
    fn create_bar(&mut self, price: f64, date: NaiveDate) -> PriceBar {
        // ±1% intraday range around the close
        let noise_pct = 0.01;

        let high = price * (1.0 + self.rng.gen_range(0.0..noise_pct));
        let low = price * (1.0 - self.rng.gen_range(0.0..noise_pct));
        let open = (price * (1.0 + self.rng.gen_range(-noise_pct..noise_pct))).clamp(low, high);

        // Vary volume ±30%
        let volume = (self.base_volume * self.rng.gen_range(0.7..1.3)).round();

        PriceBar {
            date,
            open,
            high,
            low,
            close: price,
            volume,
        }
    }
}
