//! Scenario tests for the strategy simulator.
//!
//! Fast = SMA(1) and slow = SMA(2) keep the arithmetic readable: the fast line
//! is above the slow line exactly when the close rose from the previous candle.

use chrono::{Duration, TimeZone, Utc};
use walkforge_core::domain::{stop_loss_price, take_profit_price};
use walkforge_core::indicators::MaType;
use walkforge_core::{
    simulate, step, Candle, ExitReason, ParameterSet, Side, SimState, SimulationSettings,
    StepContext, StrategyParams,
};

fn candles(closes: &[f64]) -> Vec<Candle> {
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Candle {
            open_time: base + Duration::minutes(15 * i as i64),
            open: c,
            high: c * 1.001,
            low: c * 0.999,
            close: c,
            volume: 100.0,
        })
        .collect()
}

fn quick_params() -> StrategyParams {
    StrategyParams {
        ma_type: MaType::Sma,
        fast_period: 1,
        slow_period: 2,
        take_profit_pct: 0.0,
        stop_loss_pct: 0.0,
        ..StrategyParams::default()
    }
}

fn settings() -> SimulationSettings {
    SimulationSettings {
        initial_balance: 1_000.0,
        fee_rate: 0.0,
        ..SimulationSettings::default()
    }
}

// ── Crossover timing ─────────────────────────────────────────────────

#[test]
fn three_candle_crossover_enters_on_the_crossing_candle() {
    let data = candles(&[10.0, 10.0, 12.0]);
    let result = simulate(
        &data,
        &quick_params(),
        &SimulationSettings {
            close_at_end: false,
            ..settings()
        },
    )
    .unwrap();

    let open = result.open_trade.expect("position should be open");
    assert_eq!(open.entry_index, 2);
    assert_eq!(open.entry_price, 12.0);
    assert!(result.trades.is_empty());
}

#[test]
fn huge_slow_period_is_a_quiet_zero_trade_run() {
    let data = candles(&[10.0, 12.0, 13.0]);
    for ma_type in [MaType::Sma, MaType::Ema] {
        let params = StrategyParams {
            ma_type,
            fast_period: 5,
            slow_period: 1 << 62,
            ..StrategyParams::default()
        };
        let result = simulate(&data, &params, &settings()).unwrap();
        assert!(result.trades.is_empty());
        assert!(result.open_trade.is_none());
        assert_eq!(result.final_balance, 1_000.0);
        assert_eq!(result.equity.len(), 1);
    }
}

#[test]
fn crossover_needs_previous_pair() {
    // The slow SMA is first warm at index 1; a cross can first be seen at index 2.
    let data = candles(&[10.0, 12.0, 13.0, 13.5]);
    let result = simulate(&data, &quick_params(), &settings()).unwrap();
    assert!(result.trades.is_empty());
}

#[test]
fn step_reports_cross_and_entry() {
    let params = quick_params();
    let s = settings();
    let data = candles(&[10.0, 10.0, 12.0, 12.5]);
    let mut state = SimState::new(&params, &s);
    let mut opened = Vec::new();
    for (index, candle) in data.iter().enumerate() {
        let ctx = StepContext {
            params: &params,
            settings: &s,
            index,
            is_last: index == data.len() - 1,
        };
        let (next, outcome) = step(state, candle, &ctx);
        state = next;
        if outcome.opened.is_some() {
            opened.push(index);
        }
    }
    assert_eq!(opened, vec![2]);
    assert_eq!(state.position.prev_fast, Some(12.5));
    assert_eq!(state.position.prev_slow, Some(12.25));
}

// ── TP / SL ──────────────────────────────────────────────────────────

#[test]
fn tp_sl_levels_invert_for_shorts() {
    assert!((take_profit_price(Side::Short, 100.0, 0.01) - 99.0).abs() < 1e-9);
    assert!((stop_loss_price(Side::Short, 100.0, 0.02) - 102.0).abs() < 1e-9);
    assert!((take_profit_price(Side::Long, 100.0, 0.01) - 101.0).abs() < 1e-9);
    assert!((stop_loss_price(Side::Long, 100.0, 0.02) - 98.0).abs() < 1e-9);
}

#[test]
fn short_take_profit_exit() {
    // Death cross at index 2 (100 -> 95): short at 95, TP at 95 * 0.95 = 90.25.
    let data = candles(&[100.0, 100.0, 95.0, 93.0, 90.0, 90.5]);
    let params = StrategyParams {
        enable_short: true,
        take_profit_pct: 0.05,
        stop_loss_pct: 0.02,
        ..quick_params()
    };
    let result = simulate(&data, &params, &settings()).unwrap();
    let trade = &result.trades[0];
    assert_eq!(trade.side, Side::Short);
    assert_eq!(trade.entry_index, 2);
    assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
    assert_eq!(trade.exit_index, 4);
    assert!(trade.pnl_usd > 0.0);
}

#[test]
fn short_stop_loss_exit() {
    // Short at 95, SL at 96.9. Index 3 closes at 97: SL, although it is also a golden cross.
    let data = candles(&[100.0, 100.0, 95.0, 97.0, 97.5]);
    let params = StrategyParams {
        enable_short: true,
        stop_loss_pct: 0.02,
        ..quick_params()
    };
    let result = simulate(&data, &params, &settings()).unwrap();
    assert_eq!(result.trades[0].exit_reason, ExitReason::StopLoss);
    assert_eq!(result.trades[0].exit_index, 3);
}

// ── Cooldown ─────────────────────────────────────────────────────────
//
// Long at index 2 (close 11), stop-loss at index 3 (close 10). With a cooldown
// of 2, golden crosses at indices 4 and 5 are ignored and index 6 is eligible.

fn cooldown_params(cooldown: usize) -> StrategyParams {
    StrategyParams {
        stop_loss_pct: 0.05,
        cooldown_candles: cooldown,
        ..quick_params()
    }
}

#[test]
fn cooldown_blocks_first_candle_after_exit() {
    let data = candles(&[10.0, 10.0, 11.0, 10.0, 10.5, 10.6]);
    let blocked = simulate(&data, &cooldown_params(2), &settings()).unwrap();
    assert_eq!(blocked.trades.len(), 1);
    assert_eq!(blocked.trades[0].exit_reason, ExitReason::StopLoss);

    let free = simulate(&data, &cooldown_params(0), &settings()).unwrap();
    assert_eq!(free.trades.len(), 2);
    assert_eq!(free.trades[1].entry_index, 4);
}

#[test]
fn cooldown_blocks_second_candle_after_exit() {
    let data = candles(&[10.0, 10.0, 11.0, 10.0, 9.5, 10.0, 10.1]);
    let result = simulate(&data, &cooldown_params(2), &settings()).unwrap();
    assert_eq!(result.trades.len(), 1);
}

#[test]
fn cooldown_allows_third_candle_after_exit() {
    let data = candles(&[10.0, 10.0, 11.0, 10.0, 9.5, 9.0, 9.5, 9.6]);
    let result = simulate(&data, &cooldown_params(2), &settings()).unwrap();
    assert_eq!(result.trades.len(), 2);
    assert_eq!(result.trades[1].entry_index, 6);
    assert_eq!(result.trades[1].exit_reason, ExitReason::EndOfData);
}

// ── Filters ──────────────────────────────────────────────────────────

#[test]
fn htf_bias_blocks_shorts_in_uptrend() {
    // Steady rise, then a single dip that is a death cross.
    let mut closes: Vec<f64> = (0..24).map(|i| 100.0 + i as f64).collect();
    closes.extend([120.0, 119.0, 118.0]);
    let data = candles(&closes);
    let base = StrategyParams {
        enable_short: true,
        ..quick_params()
    };

    let unfiltered = simulate(&data, &base, &settings()).unwrap();
    assert!(unfiltered.trades.iter().any(|t| t.side == Side::Short));

    let filtered = StrategyParams {
        htf_bias_enabled: true,
        htf_multiplier: 4,
        htf_ema_period: 3,
        ..base
    };
    let result = simulate(&data, &filtered, &settings()).unwrap();
    assert!(result.trades.iter().all(|t| t.side == Side::Long));
}

#[test]
fn min_separation_blocks_weak_crosses() {
    // Cross at index 2 with |fast - slow| / close = 0.05 / 10.1 < 1%.
    let data = candles(&[10.0, 10.0, 10.1, 10.2]);
    let params = StrategyParams {
        min_separation_pct: 0.01,
        ..quick_params()
    };
    let result = simulate(&data, &params, &settings()).unwrap();
    assert!(result.trades.is_empty());
}

// ── Accounting ───────────────────────────────────────────────────────

#[test]
fn leverage_scales_quantity_and_pnl_pct() {
    let data = candles(&[10.0, 10.0, 12.0, 13.2]);
    let levered = SimulationSettings {
        leverage: 3.0,
        position_fraction: 0.5,
        ..settings()
    };
    let result = simulate(&data, &quick_params(), &levered).unwrap();
    let trade = &result.trades[0];
    // margin 500, notional 1500, qty 125; +1.2 * 125 = 150 => 30% of margin
    assert!((trade.quantity - 125.0).abs() < 1e-9);
    assert!((trade.pnl_usd - 150.0).abs() < 1e-9);
    assert!((trade.pnl_pct - 30.0).abs() < 1e-9);
    let final_point = result.equity.last().unwrap();
    assert!((final_point.cumulative_balance - 1_150.0).abs() < 1e-9);
}

#[test]
fn typed_params_come_from_parameter_sets() {
    let set = ParameterSet::new()
        .with("ma_type", "sma")
        .with("fast_period", 1i64)
        .with("slow_period", 2i64)
        .with("take_profit_pct", 0i64)
        .with("stop_loss_pct", 0i64);
    let params = StrategyParams::from_parameter_set(&set).unwrap();
    assert_eq!(params, quick_params());
}
