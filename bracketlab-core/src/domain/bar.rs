//! Bar, the fundamental market data unit.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from bar validation.
#[derive(Debug, Error, PartialEq)]
pub enum BarError {
    #[error("bar {0} has NaN fields")]
    Void(NaiveDate),

    #[error("bar {0} has inconsistent OHLC values")]
    Insane(NaiveDate),

    #[error("bar {0} is not after the previous bar {1}")]
    OutOfOrder(NaiveDate, NaiveDate),
}

/// OHLCV bar for the single traded instrument on one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: u64,
}

impl Bar {
    /// Returns true if any OHLC field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }

    pub fn validate(&self) -> Result<(), BarError> {
        if self.is_void() {
            return Err(BarError::Void(self.date));
        }
        if !self.is_sane() {
            return Err(BarError::Insane(self.date));
        }
        Ok(())
    }
}

/// Validate every bar and check dates are strictly increasing.
pub fn validate_series(bars: &[Bar]) -> Result<(), BarError> {
    for (i, bar) in bars.iter().enumerate() {
        bar.validate()?;
        if i > 0 && bar.date <= bars[i - 1].date {
            return Err(BarError::OutOfOrder(bar.date, bars[i - 1].date));
        }
    }
    Ok(())
}
