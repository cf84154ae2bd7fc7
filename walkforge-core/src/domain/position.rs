//! PositionState — the per-run mutable record threaded through the step function.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::trade::Side;

/// The currently open position, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub entry_index: usize,
    pub quantity: f64,
    /// Margin committed at entry (balance × position fraction).
    pub margin: f64,
    pub entry_fee: f64,
    /// Highest close since entry (longs) or lowest close (shorts).
    pub water_mark: f64,
    pub trailing_armed: bool,
}

impl OpenPosition {
    /// Take-profit level, or `None` when disabled.
    pub fn take_profit_level(&self, tp_pct: f64) -> Option<f64> {
        (tp_pct > 0.0).then(|| take_profit_price(self.side, self.entry_price, tp_pct))
    }

    /// Stop-loss level, or `None` when disabled.
    pub fn stop_loss_level(&self, sl_pct: f64) -> Option<f64> {
        (sl_pct > 0.0).then(|| stop_loss_price(self.side, self.entry_price, sl_pct))
    }
}

/// Long: entry × (1 + tp). Short: entry × (1 − tp).
pub fn take_profit_price(side: Side, entry: f64, tp_pct: f64) -> f64 {
    match side {
        Side::Long => entry * (1.0 + tp_pct),
        Side::Short => entry * (1.0 - tp_pct),
    }
}

/// Long: entry × (1 − sl). Short: entry × (1 + sl).
pub fn stop_loss_price(side: Side, entry: f64, sl_pct: f64) -> f64 {
    match side {
        Side::Long => entry * (1.0 - sl_pct),
        Side::Short => entry * (1.0 + sl_pct),
    }
}

/// Position bookkeeping for exactly one simulator run.
///
/// `prev_fast` / `prev_slow` hold the moving-average values of the previous
/// candle. They are written at the very end of each step, after crossover
/// detection has read them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    pub position: Option<OpenPosition>,
    pub prev_fast: Option<f64>,
    pub prev_slow: Option<f64>,
    /// Candles remaining before a new entry is allowed.
    pub cooldown_remaining: usize,
    /// Realized balance (initial balance plus closed-trade PnL).
    pub balance: f64,
}

impl PositionState {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            position: None,
            prev_fast: None,
            prev_slow: None,
            cooldown_remaining: 0,
            balance: initial_balance,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    pub fn side(&self) -> Option<Side> {
        self.position.as_ref().map(|p| p.side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "{actual} != {expected}");
    }

    #[test]
    fn long_levels() {
        assert_close(take_profit_price(Side::Long, 100.0, 0.01), 101.0);
        assert_close(stop_loss_price(Side::Long, 100.0, 0.02), 98.0);
    }

    #[test]
    fn short_levels_invert() {
        assert_close(take_profit_price(Side::Short, 100.0, 0.01), 99.0);
        assert_close(stop_loss_price(Side::Short, 100.0, 0.02), 102.0);
    }

    #[test]
    fn zero_pct_disables_level() {
        let pos = OpenPosition {
            side: Side::Long,
            entry_price: 100.0,
            entry_time: Utc.timestamp_opt(0, 0).unwrap(),
            entry_index: 0,
            quantity: 1.0,
            margin: 100.0,
            entry_fee: 0.0,
            water_mark: 100.0,
            trailing_armed: false,
        };
        assert!(pos.take_profit_level(0.0).is_none());
        assert!(pos.stop_loss_level(0.0).is_none());
        assert!(pos.stop_loss_level(0.02).is_some());
    }

    #[test]
    fn fresh_state_is_flat() {
        let state = PositionState::new(1_000.0);
        assert!(state.is_flat());
        assert_eq!(state.cooldown_remaining, 0);
        assert!(state.prev_fast.is_none());
    }
}
