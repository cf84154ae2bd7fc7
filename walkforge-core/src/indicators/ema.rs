//! Exponential Moving Average (EMA), streaming form.
//!
//! Recursive: EMA[t] = alpha * close[t] + (1 - alpha) * EMA[t-1]
//! Seed: EMA[period-1] = SMA of the first `period` closes.
//! The state carries across calls; nothing is recomputed from history.

use super::MovingAverage;

#[derive(Debug, Clone, PartialEq)]
pub struct Ema {
    period: usize,
    alpha: f64,
    seed_sum: f64,
    seen: usize,
    value: Option<f64>,
}

impl Ema {
    /// `period` is clamped to at least 1.
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            seed_sum: 0.0,
            seen: 0,
            value: None,
        }
    }
}

impl MovingAverage for Ema {
    fn period(&self) -> usize {
        self.period
    }

    fn update(&mut self, close: f64) -> Option<f64> {
        self.seen += 1;
        match self.value {
            Some(prev) => {
                let next = self.alpha * close + (1.0 - self.alpha) * prev;
                self.value = Some(next);
            }
            None => {
                self.seed_sum += close;
                if self.seen == self.period {
                    self.value = Some(self.seed_sum / self.period as f64);
                }
            }
        }
        self.value
    }

    fn value(&self) -> Option<f64> {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, compute_series, DEFAULT_EPSILON};

    #[test]
    fn ema_period_1_equals_close() {
        let result = compute_series(&mut Ema::new(1), &[100.0, 200.0, 300.0]);
        assert_approx(result[0], 100.0, DEFAULT_EPSILON);
        assert_approx(result[1], 200.0, DEFAULT_EPSILON);
        assert_approx(result[2], 300.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_3_known_values() {
        // alpha = 0.5, seed at index 2 = SMA(10, 11, 12) = 11
        // EMA[3] = 0.5*13 + 0.5*11 = 12, EMA[4] = 0.5*14 + 0.5*12 = 13
        let result = compute_series(&mut Ema::new(3), &[10.0, 11.0, 12.0, 13.0, 14.0]);
        assert!(result[0].is_nan());
        assert!(result[1].is_nan());
        assert_approx(result[2], 11.0, DEFAULT_EPSILON);
        assert_approx(result[3], 12.0, DEFAULT_EPSILON);
        assert_approx(result[4], 13.0, DEFAULT_EPSILON);
    }

    #[test]
    fn streaming_matches_restart_from_scratch() {
        let closes = [10.0, 10.5, 11.2, 10.9, 11.7, 12.3, 12.0, 12.8];
        let mut streaming = Ema::new(4);
        for (i, &close) in closes.iter().enumerate() {
            let live = streaming.update(close);
            let mut fresh = Ema::new(4);
            let replay = closes[..=i].iter().map(|&c| fresh.update(c)).last().flatten();
            assert_eq!(live, replay, "divergence at index {i}");
        }
    }

    #[test]
    fn zero_period_is_clamped() {
        assert_eq!(Ema::new(0).period(), 1);
    }
}
