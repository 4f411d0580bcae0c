//! Simple Moving Average (SMA) of closes.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    /// Callers validate `period >= 1` through `StrategyConfig::validate`.
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            name: format!("sma_{period}"),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let mut result = vec![f64::NAN; bars.len()];
        let mut sum = 0.0;
        // Count of NaN closes currently inside the window.
        let mut nans = 0usize;

        for (i, bar) in bars.iter().enumerate() {
            if bar.close.is_nan() {
                nans += 1;
            } else {
                sum += bar.close;
            }

            if i >= self.period {
                let leaving = bars[i - self.period].close;
                if leaving.is_nan() {
                    nans -= 1;
                } else {
                    sum -= leaving;
                }
            }

            if i + 1 >= self.period && nans == 0 {
                result[i] = sum / self.period as f64;
            }
        }

        result
    }
}
