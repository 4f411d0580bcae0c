//! Moving-average crossover detection.
//!
//! A cross up fires when the fast average moves from at-or-below the slow
//! average on the previous step to strictly above it on the current step.
//! A cross down is the mirror. Anything short of two valid samples per
//! series yields no signal.

use serde::{Deserialize, Serialize};

/// Outcome of comparing the last two samples of the fast and slow series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrossSignal {
    CrossUp,
    CrossDown,
    NoSignal,
}

/// Classify a crossover from the previous and current samples.
///
/// NaN in any input (indicator warmup) yields `NoSignal`.
pub fn detect_cross(fast_prev: f64, slow_prev: f64, fast_now: f64, slow_now: f64) -> CrossSignal {
    if fast_prev.is_nan() || slow_prev.is_nan() || fast_now.is_nan() || slow_now.is_nan() {
        return CrossSignal::NoSignal;
    }
    if fast_prev <= slow_prev && fast_now > slow_now {
        CrossSignal::CrossUp
    } else if fast_prev >= slow_prev && fast_now < slow_now {
        CrossSignal::CrossDown
    } else {
        CrossSignal::NoSignal
    }
}

/// Evaluate the cross at `index` over precomputed series.
pub fn evaluate_series(fast: &[f64], slow: &[f64], index: usize) -> CrossSignal {
    if index == 0 || index >= fast.len() || index >= slow.len() {
        return CrossSignal::NoSignal;
    }
    detect_cross(fast[index - 1], slow[index - 1], fast[index], slow[index])
}

/// Streaming evaluator fed one `(fast, slow)` pair per step.
#[derive(Debug, Clone, Default)]
pub struct CrossoverEvaluator {
    prev: Option<(f64, f64)>,
}

impl CrossoverEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, fast: f64, slow: f64) -> CrossSignal {
        let signal = match self.prev {
            Some((fast_prev, slow_prev)) => detect_cross(fast_prev, slow_prev, fast, slow),
            None => CrossSignal::NoSignal,
        };
        self.prev = Some((fast, slow));
        signal
    }
}
