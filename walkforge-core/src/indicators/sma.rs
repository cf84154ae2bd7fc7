//! Simple Moving Average (SMA), streaming form.
//!
//! Rolling mean of closes over a fixed window. First value after `period` closes.

use std::collections::VecDeque;

use super::MovingAverage;

#[derive(Debug, Clone, PartialEq)]
pub struct Sma {
    period: usize,
    window: VecDeque<f64>,
    sum: f64,
}

impl Sma {
    /// `period` is clamped to at least 1.
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            // Grows to period + 1 at most; huge periods must not preallocate.
            window: VecDeque::new(),
            sum: 0.0,
        }
    }
}

impl MovingAverage for Sma {
    fn period(&self) -> usize {
        self.period
    }

    fn update(&mut self, close: f64) -> Option<f64> {
        self.window.push_back(close);
        self.sum += close;
        if self.window.len() > self.period {
            if let Some(leaving) = self.window.pop_front() {
                self.sum -= leaving;
            }
        }
        self.value()
    }

    fn value(&self) -> Option<f64> {
        (self.window.len() == self.period).then(|| self.sum / self.period as f64)
    }
}
