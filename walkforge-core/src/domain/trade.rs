//! Trade — a completed (or still open) round trip, plus the equity samples
//! derived from closing trades.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
    SignalReversal,
    EndOfData,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::SignalReversal => "signal_reversal",
            ExitReason::EndOfData => "end_of_data",
        };
        f.write_str(s)
    }
}

/// A closed round-trip trade. Immutable once produced by the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub side: Side,

    // ── Entry ──
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub entry_index: usize,

    // ── Exit ──
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_index: usize,
    pub exit_reason: ExitReason,

    // ── Size & PnL ──
    pub quantity: f64,
    /// Entry plus exit fees, in quote currency.
    pub fee: f64,
    /// Net of fees.
    pub pnl_usd: f64,
    /// Net PnL as a percentage of the margin committed.
    pub pnl_pct: f64,

    pub candles_held: usize,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.pnl_usd > 0.0
    }
}

/// A position still open when the simulation stopped (`close_at_end = false`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenTrade {
    pub side: Side,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub entry_index: usize,
    pub quantity: f64,
    pub entry_fee: f64,
    /// Mark-to-market PnL at the last close, before exit fees.
    pub unrealized_pnl_usd: f64,
}

/// Realized balance after a trade close (or at the start of a run).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub time: DateTime<Utc>,
    pub cumulative_balance: f64,
}
