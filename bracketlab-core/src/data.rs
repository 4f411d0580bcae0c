//! Bar sources for a run.
//!
//! Bars come either from a JSON file (an array of [`Bar`] objects) or from a
//! deterministic synthetic random walk seeded by the symbol name. Synthetic
//! data is for development and smoke tests only.

use crate::domain::bar::validate_series;
use crate::domain::{Bar, BarError};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read bars: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse bars: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Bar(#[from] BarError),
}

/// Load a JSON array of bars and check it is sane and date-ordered.
pub fn load_json_bars(path: &Path) -> Result<Vec<Bar>, DataError> {
    let text = std::fs::read_to_string(path)?;
    parse_json_bars(&text)
}

pub fn parse_json_bars(text: &str) -> Result<Vec<Bar>, DataError> {
    let bars: Vec<Bar> = serde_json::from_str(text)?;
    validate_series(&bars)?;
    Ok(bars)
}

/// Keep bars whose date lies in `[from, to]`; `None` leaves that side open.
pub fn filter_range(bars: Vec<Bar>, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Vec<Bar> {
    bars.into_iter()
        .filter(|b| from.map_or(true, |f| b.date >= f))
        .filter(|b| to.map_or(true, |t| b.date <= t))
        .collect()
}

/// Weekday-only random walk from 100.0 with daily returns in ±3%.
///
/// The RNG is seeded from the BLAKE3 hash of `symbol`, so the same symbol and
/// range always produce the same bars.
pub fn synthetic_bars(symbol: &str, start: NaiveDate, end: NaiveDate) -> Vec<Bar> {
    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let mut bars = Vec::new();
    let mut price = 100.0_f64;
    let mut current = start;

    while current <= end {
        if matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            current += Duration::days(1);
            continue;
        }

        let daily_return: f64 = rng.gen_range(-0.03..0.03);
        let open = price;
        let close = price * (1.0 + daily_return);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
        let volume = rng.gen_range(500_000..5_000_000u64);

        bars.push(Bar {
            date: current,
            open,
            high,
            low,
            close,
            volume,
        });

        price = close;
        current += Duration::days(1);
    }

    bars
}
