//! Walk-forward orchestration — optimize on each train slice, replay the
//! winner on the following test slice, and aggregate out-of-sample results.
//!
//! Windows run strictly in index order. Within a window the parameter search
//! fans out over a worker pool; the test replay uses exactly the ParameterSet
//! the search selected. Only data-integrity and configuration errors abort a
//! run: a window with no qualifying parameters is recorded as disqualified and
//! the run moves on. Cancellation stops before the next window (or between
//! candidate evaluations) and keeps every window already completed.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use walkforge_core::{
    simulate, CandleSeries, EquityPoint, ParamError, ParameterSet, SimulationError,
    StrategyKind, StrategyParams, Trade,
};

use crate::config::{ConfigError, WalkForwardConfig};
use crate::fitness::OptimizationMetric;
use crate::metrics::{mean, median, Metrics};
use crate::param_space::ParameterSpace;
use crate::schedule::{schedule_windows, ScheduleError, Window};
use crate::search::{run_search, SearchConfig, SearchError};
use crate::task::{ProgressEvent, TaskState, TaskStatus};

/// Version stamped into every serialized [`WalkForwardResult`].
pub const SCHEMA_VERSION: u32 = 1;

/// Mean train objective below which a ratio is meaningless and the
/// difference is reported instead.
const LOW_TRAIN_OBJECTIVE: f64 = 0.1;

// ─── Run control ─────────────────────────────────────────────────────

/// Cancellation flag plus optional progress sinks for one run.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    pub cancel: Arc<AtomicBool>,
    events: Option<Sender<ProgressEvent>>,
    state: Option<Arc<TaskState>>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, events: Sender<ProgressEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub(crate) fn with_state(mut self, state: Arc<TaskState>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn notify(&self, event: ProgressEvent) {
        if let Some(state) = &self.state {
            state.apply(&event);
        }
        if let Some(tx) = &self.events {
            // A dropped receiver just means nobody is listening any more.
            let _ = tx.send(event);
        }
    }
}

// ─── Result types ────────────────────────────────────────────────────

/// Outcome of one train/test window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowResult {
    pub window: Window,
    /// The train-selected set; `None` when nothing qualified.
    pub best_params: Option<ParameterSet>,
    pub train_metrics: Option<Metrics>,
    pub test_metrics: Metrics,
    pub train_objective: Option<f64>,
    pub test_objective: Option<f64>,
    /// Empty when disqualified or when the run was configured without trades.
    pub test_trades: Vec<Trade>,
    pub test_trade_count: usize,
    pub disqualified: bool,
    pub disqualify_reason: Option<String>,
    pub candidates_evaluated: usize,
    pub candidates_disqualified: usize,
    pub candidates_skipped: usize,
}

impl WindowResult {
    /// Train and test objectives landed on opposite sides of neutral.
    pub fn is_overfit(&self, metric: OptimizationMetric) -> bool {
        match (self.train_objective, self.test_objective) {
            (Some(train), Some(test)) => metric.signum(train) != metric.signum(test),
            _ => false,
        }
    }
}

/// Mean and median of one metric across qualifying windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub mean: f64,
    pub median: f64,
}

impl MetricStats {
    fn of(values: &[f64]) -> Self {
        Self {
            mean: mean(values),
            median: median(values),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestMetricStats {
    pub total_return_pct: MetricStats,
    pub win_rate: MetricStats,
    pub max_drawdown_pct: MetricStats,
    pub sharpe_like_ratio: MetricStats,
    pub robust_score: MetricStats,
    pub total_trades: MetricStats,
}

/// How the degradation ratio was computed (or why it wasn't).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationFlag {
    /// Mean train objective >= 0.1: ratio = test / train.
    Normal,
    /// Mean train objective in [0, 0.1): difference test − train instead.
    LowTrainObjective,
    /// Mean train objective negative: no ratio.
    NegativeTrainObjective,
    /// Positive train objective but negative test objective: clamped to 0.
    FailedTest,
    /// Every window was disqualified.
    NoQualifyingWindows,
}

/// Overfitting risk from the relative drop between train and test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverfittingRisk {
    /// Drop <= 5%.
    Low,
    /// 5% < drop <= 10%.
    Medium,
    /// 10% < drop <= 20%.
    High,
    /// Drop > 20%.
    Severe,
}

impl OverfittingRisk {
    pub fn from_degradation(drop: f64) -> Self {
        if drop <= 0.05 {
            Self::Low
        } else if drop <= 0.10 {
            Self::Medium
        } else if drop <= 0.20 {
            Self::High
        } else {
            Self::Severe
        }
    }
}

/// Aggregate view across all completed windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardSummary {
    pub qualifying_windows: usize,
    pub disqualified_windows: usize,
    pub test_stats: TestMetricStats,
    /// Metrics of every test trade back to back.
    pub overall_metrics: Metrics,
    /// Balance curve stitched from test-window trades only.
    pub equity: Vec<EquityPoint>,
    pub overfit_windows: usize,
    pub mean_train_objective: f64,
    pub mean_test_objective: f64,
    pub degradation_ratio: Option<f64>,
    pub degradation_flag: DegradationFlag,
    pub overfitting_risk: Option<OverfittingRisk>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardResult {
    pub schema_version: u32,
    pub symbol: String,
    pub strategy: StrategyKind,
    pub metric: OptimizationMetric,
    pub config_fingerprint: String,
    /// `Completed` or `Cancelled`.
    pub status: TaskStatus,
    pub total_windows: usize,
    pub windows: Vec<WindowResult>,
    pub summary: WalkForwardSummary,
}

#[derive(Debug, Error)]
pub enum WalkForwardError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),
    #[error("window scheduling failed")]
    Schedule(#[from] ScheduleError),
    #[error("parameter search failed in window {window}")]
    Search {
        window: usize,
        #[source]
        source: SearchError,
    },
    #[error("selected parameters are invalid in window {window}")]
    SelectedParams {
        window: usize,
        #[source]
        source: ParamError,
    },
    #[error("test simulation failed in window {window}")]
    TestSimulation {
        window: usize,
        #[source]
        source: SimulationError,
    },
    #[error("walk-forward worker panicked")]
    WorkerPanicked,
}

// ─── Orchestration ───────────────────────────────────────────────────

/// Run a full walk-forward over `series`, blocking until done or cancelled.
pub fn run_walk_forward(
    config: &WalkForwardConfig,
    series: &CandleSeries,
    control: &RunControl,
) -> Result<WalkForwardResult, WalkForwardError> {
    let outcome = run_inner(config, series, control);
    let status = match &outcome {
        Ok(result) => result.status,
        Err(_) => TaskStatus::Failed,
    };
    control.notify(ProgressEvent::Finished { status });
    outcome
}

fn run_inner(
    config: &WalkForwardConfig,
    series: &CandleSeries,
    control: &RunControl,
) -> Result<WalkForwardResult, WalkForwardError> {
    config.validate()?;
    let space = ParameterSpace::new(&config.param_ranges).map_err(ConfigError::from)?;
    let search = config.search_config();
    let schedule = schedule_windows(&config.schedule_spec())?;
    let total_windows = schedule.len();

    info!(
        symbol = %config.symbol,
        strategy = %config.strategy,
        windows = total_windows,
        combinations = space.size(),
        method = %config.method,
        metric = %config.metric,
        "walk-forward started"
    );
    if total_windows == 0 {
        warn!(
            start = %config.start,
            end = %config.end,
            "range too short for one training plus one test period"
        );
    }
    control.notify(ProgressEvent::Started { total_windows });

    let mut windows = Vec::with_capacity(total_windows);
    let mut status = TaskStatus::Completed;
    for window in &schedule {
        if control.is_cancelled() {
            status = TaskStatus::Cancelled;
            break;
        }
        match run_window(config, series, &space, &search, window, control)? {
            Some(result) => {
                control.notify(ProgressEvent::WindowCompleted {
                    index: window.index,
                    completed: windows.len() + 1,
                    total: total_windows,
                    disqualified: result.disqualified,
                });
                windows.push(result);
            }
            None => {
                status = TaskStatus::Cancelled;
                break;
            }
        }
    }

    if status == TaskStatus::Cancelled {
        warn!(completed = windows.len(), total = total_windows, "walk-forward cancelled");
    }

    let summary = summarize(&windows, config.metric, config.simulation.initial_balance);
    info!(
        completed = windows.len(),
        qualifying = summary.qualifying_windows,
        overfit = summary.overfit_windows,
        total_return_pct = summary.overall_metrics.total_return_pct,
        risk = ?summary.overfitting_risk,
        "walk-forward finished"
    );

    let windows = if config.include_trades {
        windows
    } else {
        windows
            .into_iter()
            .map(|mut w| {
                w.test_trades.clear();
                w
            })
            .collect()
    };

    Ok(WalkForwardResult {
        schema_version: SCHEMA_VERSION,
        symbol: config.symbol.clone(),
        strategy: config.strategy,
        metric: config.metric,
        config_fingerprint: config.fingerprint(),
        status,
        total_windows,
        windows,
        summary,
    })
}

/// Search, then replay on test. `Ok(None)` means the run was cancelled
/// mid-window.
fn run_window(
    config: &WalkForwardConfig,
    series: &CandleSeries,
    space: &ParameterSpace,
    search: &SearchConfig,
    window: &Window,
    control: &RunControl,
) -> Result<Option<WindowResult>, WalkForwardError> {
    let train = series.slice(window.train_start, window.train_end);
    let test = series.slice(window.test_start, window.test_end);
    debug!(
        window = window.index,
        train_candles = train.len(),
        test_candles = test.len(),
        "window slices"
    );

    let outcome = match run_search(
        train,
        space,
        &config.base_params,
        search,
        window.index,
        &control.cancel,
    ) {
        Ok(outcome) => outcome,
        Err(SearchError::Cancelled) => return Ok(None),
        Err(source) => {
            return Err(WalkForwardError::Search {
                window: window.index,
                source,
            })
        }
    };

    let initial_balance = config.simulation.initial_balance;
    let mut result = WindowResult {
        window: *window,
        best_params: None,
        train_metrics: None,
        test_metrics: Metrics::empty(initial_balance),
        train_objective: None,
        test_objective: None,
        test_trades: Vec::new(),
        test_trade_count: 0,
        disqualified: true,
        disqualify_reason: None,
        candidates_evaluated: outcome.evaluated(),
        candidates_disqualified: outcome.disqualified.len(),
        candidates_skipped: outcome.skipped_invalid,
    };

    let Some(best) = outcome.best() else {
        let reason = outcome.no_qualifier_reason();
        warn!(window = window.index, %reason, "window disqualified");
        result.disqualify_reason = Some(reason);
        return Ok(Some(result));
    };

    // The test replay uses the selected set exactly as ranked.
    let typed = StrategyParams::from_parameter_set(&best.params).map_err(|source| {
        WalkForwardError::SelectedParams {
            window: window.index,
            source,
        }
    })?;
    let replay = simulate(test, &typed, &config.simulation).map_err(|source| {
        WalkForwardError::TestSimulation {
            window: window.index,
            source,
        }
    })?;
    let test_metrics = Metrics::compute_with(
        &replay.trades,
        &replay.equity,
        initial_balance,
        &config.robust_score,
    );
    let test_objective = config.metric.extract(&test_metrics);

    info!(
        window = window.index,
        params = %best.params,
        train_objective = best.objective,
        test_objective,
        test_trades = replay.trades.len(),
        "window complete"
    );

    result.best_params = Some(best.params.clone());
    result.train_metrics = Some(best.metrics.clone());
    result.train_objective = Some(best.objective);
    result.test_objective = Some(test_objective);
    result.test_metrics = test_metrics;
    result.test_trade_count = replay.trades.len();
    result.test_trades = replay.trades;
    result.disqualified = false;
    Ok(Some(result))
}

// ─── Aggregation ─────────────────────────────────────────────────────

fn summarize(
    windows: &[WindowResult],
    metric: OptimizationMetric,
    initial_balance: f64,
) -> WalkForwardSummary {
    let qualifying: Vec<&WindowResult> = windows.iter().filter(|w| !w.disqualified).collect();

    let collect = |f: fn(&Metrics) -> f64| -> Vec<f64> {
        qualifying.iter().map(|w| f(&w.test_metrics)).collect()
    };
    let test_stats = TestMetricStats {
        total_return_pct: MetricStats::of(&collect(|m| m.total_return_pct)),
        win_rate: MetricStats::of(&collect(|m| m.win_rate)),
        max_drawdown_pct: MetricStats::of(&collect(|m| m.max_drawdown_pct)),
        sharpe_like_ratio: MetricStats::of(&collect(|m| m.sharpe_like_ratio)),
        robust_score: MetricStats::of(&collect(|m| m.robust_score)),
        total_trades: MetricStats::of(&collect(|m| m.total_trades as f64)),
    };

    let trades: Vec<Trade> = windows
        .iter()
        .flat_map(|w| w.test_trades.iter().cloned())
        .collect();
    let equity = stitch_equity(windows, initial_balance);
    let overall_metrics = Metrics::compute(&trades, &equity, initial_balance);

    let overfit_windows = qualifying.iter().filter(|w| w.is_overfit(metric)).count();
    let train: Vec<f64> = qualifying.iter().filter_map(|w| w.train_objective).collect();
    let test: Vec<f64> = qualifying.iter().filter_map(|w| w.test_objective).collect();
    let mean_train_objective = mean(&train);
    let mean_test_objective = mean(&test);

    let (degradation_ratio, degradation_flag) = if qualifying.is_empty() {
        (None, DegradationFlag::NoQualifyingWindows)
    } else {
        compute_degradation_ratio(mean_train_objective, mean_test_objective)
    };
    let overfitting_risk = match degradation_flag {
        DegradationFlag::NoQualifyingWindows => None,
        DegradationFlag::Normal | DegradationFlag::FailedTest => degradation_ratio
            .map(|ratio| OverfittingRisk::from_degradation(1.0 - ratio)),
        // No usable ratio: fall back to the share of sign-flipped windows.
        DegradationFlag::LowTrainObjective | DegradationFlag::NegativeTrainObjective => Some(
            OverfittingRisk::from_degradation(overfit_windows as f64 / qualifying.len() as f64),
        ),
    };

    WalkForwardSummary {
        qualifying_windows: qualifying.len(),
        disqualified_windows: windows.len() - qualifying.len(),
        test_stats,
        overall_metrics,
        equity,
        overfit_windows,
        mean_train_objective,
        mean_test_objective,
        degradation_ratio,
        degradation_flag,
        overfitting_risk,
    }
}

/// One point at the first test slice start, then one per test trade close.
fn stitch_equity(windows: &[WindowResult], initial_balance: f64) -> Vec<EquityPoint> {
    let Some(first) = windows.first() else {
        return Vec::new();
    };
    let mut balance = initial_balance;
    let mut equity = vec![EquityPoint {
        time: first.window.test_start,
        cumulative_balance: balance,
    }];
    for trade in windows.iter().flat_map(|w| &w.test_trades) {
        balance += trade.pnl_usd;
        equity.push(EquityPoint {
            time: trade.exit_time,
            cumulative_balance: balance,
        });
    }
    equity
}

/// Degradation of the mean test objective relative to the mean train
/// objective.
///
/// - train >= 0.1: ratio = test / train (Normal)
/// - 0 <= train < 0.1: difference = test − train (LowTrainObjective)
/// - train < 0: skipped (NegativeTrainObjective)
/// - train >= 0.1 but test < 0: clamped to 0.0 (FailedTest)
fn compute_degradation_ratio(
    mean_train: f64,
    mean_test: f64,
) -> (Option<f64>, DegradationFlag) {
    if mean_train < 0.0 {
        (None, DegradationFlag::NegativeTrainObjective)
    } else if mean_train < LOW_TRAIN_OBJECTIVE {
        (Some(mean_test - mean_train), DegradationFlag::LowTrainObjective)
    } else if mean_test < 0.0 {
        (Some(0.0), DegradationFlag::FailedTest)
    } else {
        (Some(mean_test / mean_train), DegradationFlag::Normal)
    }
}
