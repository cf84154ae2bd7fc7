//! Candle — the fundamental market data unit, and the validated series of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One closed OHLCV candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// True when every price is finite and strictly positive.
    pub fn has_valid_prices(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .all(|p| p.is_finite() && *p > 0.0)
    }
}

/// Data-integrity errors raised while assembling a series.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CandleError {
    #[error("candle series is empty")]
    Empty,
    #[error("timestamps not strictly increasing at index {index}: {previous} then {current}")]
    NonMonotonic {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
    #[error("non-finite or non-positive price at index {index} ({open_time})")]
    InvalidPrice {
        index: usize,
        open_time: DateTime<Utc>,
    },
}

/// Immutable, validated candle sequence.
///
/// Construction guarantees: non-empty, strictly increasing `open_time`, and
/// finite positive prices. Slicing never copies.
#[derive(Debug, Clone, Serialize)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Result<Self, CandleError> {
        if candles.is_empty() {
            return Err(CandleError::Empty);
        }
        for (index, candle) in candles.iter().enumerate() {
            if !candle.has_valid_prices() {
                return Err(CandleError::InvalidPrice {
                    index,
                    open_time: candle.open_time,
                });
            }
            if index > 0 {
                let previous = candles[index - 1].open_time;
                if candle.open_time <= previous {
                    return Err(CandleError::NonMonotonic {
                        index,
                        previous,
                        current: candle.open_time,
                    });
                }
            }
        }
        Ok(Self { candles })
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    /// Always false for a constructed series; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn first_time(&self) -> DateTime<Utc> {
        self.candles[0].open_time
    }

    pub fn last_time(&self) -> DateTime<Utc> {
        self.candles[self.candles.len() - 1].open_time
    }

    /// Candles whose `open_time` lies in `[start, end)`.
    pub fn slice(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> &[Candle] {
        if end <= start {
            return &[];
        }
        let lo = self.candles.partition_point(|c| c.open_time < start);
        let hi = self.candles.partition_point(|c| c.open_time < end);
        &self.candles[lo..hi.max(lo)]
    }
}

impl<'de> Deserialize<'de> for CandleSeries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let candles = Vec::<Candle>::deserialize(deserializer)?;
        CandleSeries::new(candles).map_err(serde::de::Error::custom)
    }
}
