//! Entry filters — gate crossover entries on market conditions.
//!
//! Filters never see position state and never affect exits. They are fed the
//! same closes as the crossover indicators, one candle at a time.

use serde::{Deserialize, Serialize};

use crate::domain::Side;
use crate::indicators::{Ema, MovingAverage};

/// Outcome of gating one entry signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterVerdict {
    Passed,
    FilteredBySeparation,
    FilteredByHigherTimeframe,
}

impl FilterVerdict {
    pub fn is_passed(self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Higher-timeframe trend tracker.
///
/// Every `multiplier` candles form one higher-timeframe bar closing at the last
/// candle's close. The EMA advances only when such a bar completes, so the
/// partially built bar is never visible to the filter.
#[derive(Debug, Clone, PartialEq)]
pub struct HtfTrend {
    multiplier: usize,
    in_bar: usize,
    ema: Ema,
    last_close: Option<f64>,
}

impl HtfTrend {
    pub fn new(multiplier: usize, ema_period: usize) -> Self {
        Self {
            multiplier: multiplier.max(1),
            in_bar: 0,
            ema: Ema::new(ema_period),
            last_close: None,
        }
    }

    /// Feed one lower-timeframe close.
    pub fn update(&mut self, close: f64) {
        self.in_bar += 1;
        if self.in_bar == self.multiplier {
            self.in_bar = 0;
            self.last_close = Some(close);
            self.ema.update(close);
        }
    }

    /// Last completed higher-timeframe close below its EMA. False while cold.
    pub fn is_down(&self) -> bool {
        match (self.last_close, self.ema.value()) {
            (Some(close), Some(ema)) => close < ema,
            _ => false,
        }
    }

    pub fn ema_value(&self) -> Option<f64> {
        self.ema.value()
    }
}

/// `|fast − slow| / close` must reach `min_pct`; zero disables the check.
pub fn separation_ok(fast: f64, slow: f64, close: f64, min_pct: f64) -> bool {
    if min_pct <= 0.0 {
        return true;
    }
    (fast - slow).abs() / close >= min_pct
}

/// Apply every enabled filter to an entry in direction `side`.
pub fn evaluate_entry(
    side: Side,
    fast: f64,
    slow: f64,
    close: f64,
    min_separation_pct: f64,
    htf: Option<&HtfTrend>,
) -> FilterVerdict {
    if !separation_ok(fast, slow, close, min_separation_pct) {
        return FilterVerdict::FilteredBySeparation;
    }
    if let (Side::Short, Some(trend)) = (side, htf) {
        if !trend.is_down() {
            return FilterVerdict::FilteredByHigherTimeframe;
        }
    }
    FilterVerdict::Passed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn htf_cold_rejects_shorts() {
        let trend = HtfTrend::new(4, 3);
        assert!(!trend.is_down());
        let verdict = evaluate_entry(Side::Short, 99.0, 100.0, 100.0, 0.0, Some(&trend));
        assert_eq!(verdict, FilterVerdict::FilteredByHigherTimeframe);
    }

    #[test]
    fn htf_advances_only_on_completed_bars() {
        let mut trend = HtfTrend::new(2, 2);
        trend.update(100.0);
        assert_eq!(trend.ema_value(), None);
        trend.update(100.0); // bar 1
        trend.update(90.0);
        trend.update(90.0); // bar 2 -> seed = 95
        assert_eq!(trend.ema_value(), Some(95.0));
        assert!(trend.is_down());
    }

    #[test]
    fn htf_uptrend_blocks_short_but_not_long() {
        let mut trend = HtfTrend::new(2, 2);
        for close in [100.0, 100.0, 110.0, 110.0] {
            trend.update(close);
        }
        assert!(!trend.is_down());
        assert_eq!(
            evaluate_entry(Side::Short, 1.0, 2.0, 110.0, 0.0, Some(&trend)),
            FilterVerdict::FilteredByHigherTimeframe
        );
        assert_eq!(
            evaluate_entry(Side::Long, 2.0, 1.0, 110.0, 0.0, Some(&trend)),
            FilterVerdict::Passed
        );
    }

    #[test]
    fn separation_filter() {
        assert!(separation_ok(100.0, 100.0, 100.0, 0.0));
        assert!(!separation_ok(100.1, 100.0, 100.0, 0.01));
        assert!(separation_ok(101.0, 100.0, 100.0, 0.01));
        assert_eq!(
            evaluate_entry(Side::Long, 100.1, 100.0, 100.0, 0.01, None),
            FilterVerdict::FilteredBySeparation
        );
    }
}
