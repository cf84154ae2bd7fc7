//! Performance metrics — pure functions that reduce trades to statistics.
//!
//! Every metric is a pure function: trades and/or equity curve in, scalar out.
//! Degenerate inputs (no trades, zero dispersion, zero losses) produce 0 or
//! `None`, never NaN or infinity.

use serde::{Deserialize, Serialize};
use walkforge_core::{EquityPoint, Trade};

/// Trade count at which sample-size scaling and penalties stop changing.
pub const TRADE_SATURATION: usize = 30;

/// Coefficients for [`robust_score`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobustScoreConfig {
    /// Points of score lost per percentage point of drawdown.
    pub drawdown_weight: f64,
    /// Penalty applied in full at zero trades, fading to nothing at saturation.
    pub trade_penalty: f64,
    pub trade_saturation: usize,
}

impl Default for RobustScoreConfig {
    fn default() -> Self {
        Self {
            drawdown_weight: 0.5,
            trade_penalty: 10.0,
            trade_saturation: TRADE_SATURATION,
        }
    }
}

/// Aggregate performance metrics for one simulated slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_return_pct: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Fraction in `[0, 1]`.
    pub win_rate: f64,
    /// `None` when there are no losing trades.
    pub profit_factor: Option<f64>,
    /// Positive percentage of the running peak, e.g. `12.5`.
    pub max_drawdown_pct: f64,
    pub sharpe_like_ratio: f64,
    pub robust_score: f64,
    pub gross_profit_usd: f64,
    pub gross_loss_usd: f64,
    pub net_profit_usd: f64,
    pub final_balance: f64,
    pub avg_trade_pct: f64,
    /// Largest winner as a share of net profit; `None` when net profit <= 0.
    pub largest_win_share: Option<f64>,
}

impl Metrics {
    /// Compute every metric with the default robust-score coefficients.
    pub fn compute(trades: &[Trade], equity: &[EquityPoint], initial_balance: f64) -> Self {
        Self::compute_with(trades, equity, initial_balance, &RobustScoreConfig::default())
    }

    pub fn compute_with(
        trades: &[Trade],
        equity: &[EquityPoint],
        initial_balance: f64,
        robust: &RobustScoreConfig,
    ) -> Self {
        let gross_profit = gross_profit(trades);
        let gross_loss = gross_loss(trades);
        let net_profit = trades.iter().map(|t| t.pnl_usd).sum::<f64>();
        let final_balance = equity
            .last()
            .map(|p| p.cumulative_balance)
            .unwrap_or(initial_balance + net_profit);
        let total_return_pct = finite_or_zero(total_return_pct(initial_balance, final_balance));
        let max_drawdown_pct = finite_or_zero(max_drawdown_pct(equity));
        let winning_trades = trades.iter().filter(|t| t.is_winner()).count();

        Self {
            total_return_pct,
            total_trades: trades.len(),
            winning_trades,
            losing_trades: trades.iter().filter(|t| t.pnl_usd < 0.0).count(),
            win_rate: win_rate(trades),
            profit_factor: profit_factor(gross_profit, gross_loss),
            max_drawdown_pct,
            sharpe_like_ratio: finite_or_zero(sharpe_like_ratio(trades)),
            robust_score: finite_or_zero(robust_score(
                total_return_pct,
                max_drawdown_pct,
                trades.len(),
                robust,
            )),
            gross_profit_usd: gross_profit,
            gross_loss_usd: gross_loss,
            net_profit_usd: finite_or_zero(net_profit),
            final_balance: finite_or_zero(final_balance),
            avg_trade_pct: finite_or_zero(mean(&pnl_pcts(trades))),
            largest_win_share: largest_win_share(trades, net_profit),
        }
    }

    /// All-zero metrics for a slice with no trades at the initial balance.
    pub fn empty(initial_balance: f64) -> Self {
        Self::compute(&[], &[], initial_balance)
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// (final − initial) / initial × 100.
pub fn total_return_pct(initial_balance: f64, final_balance: f64) -> f64 {
    if initial_balance <= 0.0 {
        return 0.0;
    }
    (final_balance - initial_balance) / initial_balance * 100.0
}

/// Winners (`pnl_usd > 0`) over completed trades; 0 with no trades.
pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

pub fn gross_profit(trades: &[Trade]) -> f64 {
    trades.iter().map(|t| t.pnl_usd).filter(|p| *p > 0.0).sum()
}

/// Absolute value of the summed losing trades.
pub fn gross_loss(trades: &[Trade]) -> f64 {
    trades
        .iter()
        .map(|t| t.pnl_usd)
        .filter(|p| *p < 0.0)
        .map(f64::abs)
        .sum()
}

/// Gross profit / gross loss, `None` when there is no loss to divide by.
pub fn profit_factor(gross_profit: f64, gross_loss: f64) -> Option<f64> {
    if gross_loss <= 0.0 {
        return None;
    }
    let pf = gross_profit / gross_loss;
    pf.is_finite().then_some(pf)
}

/// Largest peak-to-trough decline of the equity curve, as a positive
/// percentage of the running peak.
pub fn max_drawdown_pct(equity: &[EquityPoint]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for point in equity {
        let balance = point.cumulative_balance;
        if balance > peak {
            peak = balance;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - balance) / peak * 100.0);
        }
    }
    max_dd
}

/// Mean / sample std of per-trade `pnl_pct`, scaled by `sqrt(min(n, 30))`.
///
/// Returns 0.0 with fewer than two trades or zero dispersion.
pub fn sharpe_like_ratio(trades: &[Trade]) -> f64 {
    let returns = pnl_pcts(trades);
    if returns.len() < 2 {
        return 0.0;
    }
    let std = sample_std(&returns);
    if std < 1e-12 {
        return 0.0;
    }
    let scale = (returns.len().min(TRADE_SATURATION) as f64).sqrt();
    mean(&returns) / std * scale
}

/// `return − w·drawdown − penalty·(1 − min(n, sat)/sat)`.
///
/// Strictly decreasing in drawdown, non-decreasing in trade count, flat past
/// saturation.
pub fn robust_score(
    total_return_pct: f64,
    max_drawdown_pct: f64,
    total_trades: usize,
    config: &RobustScoreConfig,
) -> f64 {
    let saturation = config.trade_saturation.max(1);
    let coverage = total_trades.min(saturation) as f64 / saturation as f64;
    total_return_pct - config.drawdown_weight * max_drawdown_pct
        - config.trade_penalty * (1.0 - coverage)
}

/// Largest single winner / net profit. `None` when the run did not make money.
pub fn largest_win_share(trades: &[Trade], net_profit: f64) -> Option<f64> {
    if net_profit <= 0.0 {
        return None;
    }
    let largest = trades
        .iter()
        .map(|t| t.pnl_usd)
        .filter(|p| *p > 0.0)
        .fold(0.0_f64, f64::max);
    let share = largest / net_profit;
    share.is_finite().then_some(share)
}

// ─── Helpers ────────────────────────────────────────────────────────

fn pnl_pcts(trades: &[Trade]) -> Vec<f64> {
    trades.iter().map(|t| t.pnl_pct).collect()
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, TimeZone, Utc};
    use walkforge_core::{EquityPoint, ExitReason, Side, Trade};

    /// A long trade with the given PnL on a 1 000 margin, closing at hour `i`.
    pub fn trade(i: i64, pnl_usd: f64) -> Trade {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Trade {
            side: Side::Long,
            entry_time: t0 + Duration::hours(i),
            entry_price: 100.0,
            entry_index: i as usize,
            exit_time: t0 + Duration::hours(i + 1),
            exit_price: 100.0 + pnl_usd / 10.0,
            exit_index: i as usize + 1,
            exit_reason: ExitReason::SignalReversal,
            quantity: 10.0,
            fee: 0.0,
            pnl_usd,
            pnl_pct: pnl_usd / 1_000.0 * 100.0,
            candles_held: 1,
        }
    }

    /// Equity curve implied by compounding `trades` from `initial`.
    pub fn equity(initial: f64, trades: &[Trade]) -> Vec<EquityPoint> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut balance = initial;
        let mut points = vec![EquityPoint {
            time: t0,
            cumulative_balance: initial,
        }];
        for t in trades {
            balance += t.pnl_usd;
            points.push(EquityPoint {
                time: t.exit_time,
                cumulative_balance: balance,
            });
        }
        points
    }
}
