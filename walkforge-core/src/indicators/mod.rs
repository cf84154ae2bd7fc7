//! Streaming moving averages.
//!
//! Indicators are updated one close at a time and carry their state from the
//! previous candle, so a value at candle `t` only ever depends on closes
//! `0..=t`. This is what keeps offline replay identical to a live feed.

pub mod ema;
pub mod sma;

pub use ema::Ema;
pub use sma::Sma;

use serde::{Deserialize, Serialize};

/// A single-series indicator fed one close at a time.
pub trait MovingAverage {
    fn period(&self) -> usize;

    /// Feed the next close; returns the new value once warm.
    fn update(&mut self, close: f64) -> Option<f64>;

    /// Latest value, `None` during warm-up.
    fn value(&self) -> Option<f64>;
}

/// Which moving average a crossover strategy uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaType {
    #[default]
    Ema,
    Sma,
}

impl MaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MaType::Ema => "ema",
            MaType::Sma => "sma",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "ema" => Some(MaType::Ema),
            "sma" => Some(MaType::Sma),
            _ => None,
        }
    }
}

/// Enum-dispatched moving average so simulator state stays `Clone` and owned.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyMovingAverage {
    Ema(Ema),
    Sma(Sma),
}

impl AnyMovingAverage {
    pub fn new(ma_type: MaType, period: usize) -> Self {
        match ma_type {
            MaType::Ema => Self::Ema(Ema::new(period)),
            MaType::Sma => Self::Sma(Sma::new(period)),
        }
    }
}

impl MovingAverage for AnyMovingAverage {
    fn period(&self) -> usize {
        match self {
            Self::Ema(ma) => ma.period(),
            Self::Sma(ma) => ma.period(),
        }
    }

    fn update(&mut self, close: f64) -> Option<f64> {
        match self {
            Self::Ema(ma) => ma.update(close),
            Self::Sma(ma) => ma.update(close),
        }
    }

    fn value(&self) -> Option<f64> {
        match self {
            Self::Ema(ma) => ma.value(),
            Self::Sma(ma) => ma.value(),
        }
    }
}

/// Run an indicator over a whole series; warm-up positions are NaN.
pub fn compute_series<M: MovingAverage + ?Sized>(ma: &mut M, closes: &[f64]) -> Vec<f64> {
    closes
        .iter()
        .map(|&c| ma.update(c).unwrap_or(f64::NAN))
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
