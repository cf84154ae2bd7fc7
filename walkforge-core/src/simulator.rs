//! Strategy simulator — replays one parameter configuration over a candle slice.
//!
//! The simulator is a pure state machine: [`step`] consumes a [`SimState`] and
//! one closed candle and returns the next state plus whatever happened on that
//! candle. [`simulate`] threads one fresh state through a slice. There is no
//! clock, no RNG and no I/O, so identical inputs always give identical trades.
//!
//! Per candle, in order:
//! 1. Indicators (fast, slow, optional higher-timeframe EMA) take the close.
//! 2. Crossover compares the stored previous pair against the new pair.
//! 3. An open position is checked for exits: stop-loss, take-profit,
//!    trailing stop, signal reversal, end of data. First match wins.
//! 4. A flat book with no cooldown may enter on a crossover, subject to filters.
//! 5. Cooldown ticks down on candles without an exit.
//! 6. The new indicator pair becomes the previous pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    Candle, EquityPoint, ExitReason, OpenPosition, OpenTrade, PositionState, Side, Trade,
};
use crate::indicators::{AnyMovingAverage, MovingAverage};
use crate::strategy::{evaluate_entry, Cross, FilterVerdict, HtfTrend, ParamError, StrategyParams};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("non-finite or non-positive price at index {index} ({open_time})")]
    InvalidPrice {
        index: usize,
        open_time: DateTime<Utc>,
    },
    #[error("invalid strategy parameters")]
    Params(#[from] ParamError),
    #[error("invalid simulation settings: {0}")]
    Settings(String),
}

/// Account-level settings shared by every candidate in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub initial_balance: f64,
    pub leverage: f64,
    /// Charged on entry notional and again on exit notional.
    pub fee_rate: f64,
    /// Share of the realized balance committed as margin per entry.
    pub position_fraction: f64,
    /// Force-close at the final candle; otherwise report an open trade.
    pub close_at_end: bool,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            leverage: 1.0,
            fee_rate: 0.0004,
            position_fraction: 1.0,
            close_at_end: true,
        }
    }
}

impl SimulationSettings {
    pub fn validate(&self) -> Result<(), SimulationError> {
        if !(self.initial_balance.is_finite() && self.initial_balance > 0.0) {
            return Err(SimulationError::Settings(
                "initial_balance must be > 0".into(),
            ));
        }
        if !(self.leverage.is_finite() && self.leverage > 0.0) {
            return Err(SimulationError::Settings("leverage must be > 0".into()));
        }
        if !(self.fee_rate.is_finite() && self.fee_rate >= 0.0) {
            return Err(SimulationError::Settings("fee_rate must be >= 0".into()));
        }
        if !(self.position_fraction > 0.0 && self.position_fraction <= 1.0) {
            return Err(SimulationError::Settings(
                "position_fraction must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }
}

// ─── State ──────────────────────────────────────────────────────────

/// Everything the simulator carries from one candle to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct SimState {
    pub position: PositionState,
    fast: AnyMovingAverage,
    slow: AnyMovingAverage,
    htf: Option<HtfTrend>,
}

impl SimState {
    pub fn new(params: &StrategyParams, settings: &SimulationSettings) -> Self {
        Self {
            position: PositionState::new(settings.initial_balance),
            fast: AnyMovingAverage::new(params.ma_type, params.fast_period),
            slow: AnyMovingAverage::new(params.ma_type, params.slow_period),
            htf: params
                .htf_bias_enabled
                .then(|| HtfTrend::new(params.htf_multiplier, params.htf_ema_period)),
        }
    }
}

/// Read-only inputs for one step.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub params: &'a StrategyParams,
    pub settings: &'a SimulationSettings,
    pub index: usize,
    pub is_last: bool,
}

/// What happened on one candle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepOutcome {
    pub fast: Option<f64>,
    pub slow: Option<f64>,
    pub cross: Option<Cross>,
    pub closed: Option<Trade>,
    pub opened: Option<Side>,
    /// Set when a crossover entry was blocked by a filter.
    pub filtered: Option<FilterVerdict>,
}

/// Result of replaying one slice.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimulationResult {
    pub trades: Vec<Trade>,
    pub equity: Vec<EquityPoint>,
    pub open_trade: Option<OpenTrade>,
    pub final_balance: f64,
}

// ─── Step ───────────────────────────────────────────────────────────

/// Advance the state machine by one closed candle.
pub fn step(mut state: SimState, candle: &Candle, ctx: &StepContext<'_>) -> (SimState, StepOutcome) {
    let params = ctx.params;
    let close = candle.close;

    let fast = state.fast.update(close);
    let slow = state.slow.update(close);
    if let Some(htf) = state.htf.as_mut() {
        htf.update(close);
    }

    let cross = match (state.position.prev_fast, state.position.prev_slow, fast, slow) {
        (Some(pf), Some(ps), Some(f), Some(s)) => Cross::detect(pf, ps, f, s),
        _ => None,
    };

    let mut outcome = StepOutcome {
        fast,
        slow,
        cross,
        ..StepOutcome::default()
    };

    // Exits. Entries only happen after this block, so a position is never
    // exited on the candle that opened it.
    let mut exited = false;
    if let Some(mut pos) = state.position.position.take() {
        track_water_mark(&mut pos, close, params);
        match exit_reason(&pos, close, cross, params, ctx) {
            Some(reason) => {
                let trade = close_position(&pos, candle, ctx.index, reason, ctx.settings);
                state.position.balance += trade.pnl_usd;
                state.position.cooldown_remaining = params.cooldown_candles;
                outcome.closed = Some(trade);
                exited = true;
            }
            None => state.position.position = Some(pos),
        }
    }

    // Entries. On the final candle only when the position will be reported
    // open rather than force-closed.
    let can_enter = state.position.is_flat()
        && state.position.cooldown_remaining == 0
        && (!ctx.is_last || !ctx.settings.close_at_end)
        && state.position.balance > 0.0;
    if can_enter {
        let side = match cross {
            Some(Cross::Golden) => Some(Side::Long),
            Some(Cross::Death) if params.enable_short => Some(Side::Short),
            _ => None,
        };
        if let (Some(side), Some(f), Some(s)) = (side, fast, slow) {
            let verdict =
                evaluate_entry(side, f, s, close, params.min_separation_pct, state.htf.as_ref());
            if verdict.is_passed() {
                state.position.position =
                    Some(open_position(side, candle, ctx.index, state.position.balance, ctx.settings));
                outcome.opened = Some(side);
            } else {
                outcome.filtered = Some(verdict);
            }
        }
    }

    if !exited && state.position.cooldown_remaining > 0 {
        state.position.cooldown_remaining -= 1;
    }

    state.position.prev_fast = fast;
    state.position.prev_slow = slow;

    (state, outcome)
}

fn track_water_mark(pos: &mut OpenPosition, close: f64, params: &StrategyParams) {
    pos.water_mark = match pos.side {
        Side::Long => pos.water_mark.max(close),
        Side::Short => pos.water_mark.min(close),
    };
    if params.trailing_stop_enabled && !pos.trailing_armed {
        let favourable = pos.side.sign() * (close - pos.entry_price) / pos.entry_price;
        pos.trailing_armed = favourable >= params.trailing_activation_pct;
    }
}

fn exit_reason(
    pos: &OpenPosition,
    close: f64,
    cross: Option<Cross>,
    params: &StrategyParams,
    ctx: &StepContext<'_>,
) -> Option<ExitReason> {
    let side = pos.side;

    if let Some(sl) = pos.stop_loss_level(params.stop_loss_pct) {
        let hit = match side {
            Side::Long => close <= sl,
            Side::Short => close >= sl,
        };
        if hit {
            return Some(ExitReason::StopLoss);
        }
    }

    if let Some(tp) = pos.take_profit_level(params.take_profit_pct) {
        let hit = match side {
            Side::Long => close >= tp,
            Side::Short => close <= tp,
        };
        if hit {
            return Some(ExitReason::TakeProfit);
        }
    }

    if params.trailing_stop_enabled && pos.trailing_armed {
        let d = params.trailing_distance_pct;
        let hit = match side {
            Side::Long => close <= pos.water_mark * (1.0 - d),
            Side::Short => close >= pos.water_mark * (1.0 + d),
        };
        if hit {
            return Some(ExitReason::TrailingStop);
        }
    }

    let reversal = matches!(
        (side, cross),
        (Side::Long, Some(Cross::Death)) | (Side::Short, Some(Cross::Golden))
    );
    if reversal {
        return Some(ExitReason::SignalReversal);
    }

    if ctx.is_last && ctx.settings.close_at_end {
        return Some(ExitReason::EndOfData);
    }
    None
}

fn open_position(
    side: Side,
    candle: &Candle,
    index: usize,
    balance: f64,
    settings: &SimulationSettings,
) -> OpenPosition {
    let margin = balance * settings.position_fraction;
    let notional = margin * settings.leverage;
    OpenPosition {
        side,
        entry_price: candle.close,
        entry_time: candle.open_time,
        entry_index: index,
        quantity: notional / candle.close,
        margin,
        entry_fee: notional * settings.fee_rate,
        water_mark: candle.close,
        trailing_armed: false,
    }
}

fn close_position(
    pos: &OpenPosition,
    candle: &Candle,
    index: usize,
    reason: ExitReason,
    settings: &SimulationSettings,
) -> Trade {
    let exit_price = candle.close;
    let exit_fee = exit_price * pos.quantity * settings.fee_rate;
    let fee = pos.entry_fee + exit_fee;
    let gross = pos.side.sign() * (exit_price - pos.entry_price) * pos.quantity;
    let pnl_usd = gross - fee;
    let pnl_pct = if pos.margin > 0.0 {
        pnl_usd / pos.margin * 100.0
    } else {
        0.0
    };
    Trade {
        side: pos.side,
        entry_time: pos.entry_time,
        entry_price: pos.entry_price,
        entry_index: pos.entry_index,
        exit_time: candle.open_time,
        exit_price,
        exit_index: index,
        exit_reason: reason,
        quantity: pos.quantity,
        fee,
        pnl_usd,
        pnl_pct,
        candles_held: index - pos.entry_index,
    }
}

// ─── Driver ─────────────────────────────────────────────────────────

/// Replay `candles` with one parameter configuration.
///
/// Fewer candles than the slow period simply yields no trades. Prices are
/// validated up front; a bad candle anywhere fails the whole slice.
pub fn simulate(
    candles: &[Candle],
    params: &StrategyParams,
    settings: &SimulationSettings,
) -> Result<SimulationResult, SimulationError> {
    params.validate()?;
    settings.validate()?;

    if let Some((index, candle)) = candles
        .iter()
        .enumerate()
        .find(|(_, c)| !c.has_valid_prices())
    {
        return Err(SimulationError::InvalidPrice {
            index,
            open_time: candle.open_time,
        });
    }

    let Some(first) = candles.first() else {
        return Ok(SimulationResult {
            final_balance: settings.initial_balance,
            ..SimulationResult::default()
        });
    };

    let mut equity = vec![EquityPoint {
        time: first.open_time,
        cumulative_balance: settings.initial_balance,
    }];
    if candles.len() < params.warmup_candles() {
        // The slow average never warms up, so no crossover can occur.
        return Ok(SimulationResult {
            equity,
            final_balance: settings.initial_balance,
            ..SimulationResult::default()
        });
    }

    let mut trades = Vec::new();

    let last = candles.len() - 1;
    let mut state = SimState::new(params, settings);
    for (index, candle) in candles.iter().enumerate() {
        let ctx = StepContext {
            params,
            settings,
            index,
            is_last: index == last,
        };
        let (next, outcome) = step(state, candle, &ctx);
        state = next;
        if let Some(trade) = outcome.closed {
            equity.push(EquityPoint {
                time: trade.exit_time,
                cumulative_balance: state.position.balance,
            });
            trades.push(trade);
        }
    }

    let open_trade = state.position.position.as_ref().map(|pos| {
        let mark = candles[last].close;
        OpenTrade {
            side: pos.side,
            entry_time: pos.entry_time,
            entry_price: pos.entry_price,
            entry_index: pos.entry_index,
            quantity: pos.quantity,
            entry_fee: pos.entry_fee,
            unrealized_pnl_usd: pos.side.sign() * (mark - pos.entry_price) * pos.quantity,
        }
    });

    Ok(SimulationResult {
        trades,
        equity,
        open_trade,
        final_balance: state.position.balance,
    })
}
