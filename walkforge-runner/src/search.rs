//! Parameter search — grid/random enumeration, guardrails and ranking.
//!
//! Every candidate is the base parameters overlaid with one combination from
//! the space. Candidates are simulated on a private rayon pool; results are
//! collected in enumeration order before ranking, so the ranking never depends
//! on thread scheduling.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use thiserror::Error;
use tracing::debug;

use walkforge_core::rng::RngHierarchy;
use walkforge_core::{
    simulate, Candle, ParamError, ParameterSet, SimulationError, SimulationSettings,
    StrategyParams,
};

use crate::fitness::OptimizationMetric;
use crate::metrics::{Metrics, RobustScoreConfig};
use crate::param_space::{ParameterSpace, SpaceError};

/// Hard ceiling on grid size unless the request raises it.
pub const DEFAULT_MAX_COMBINATIONS: usize = 10_000;

/// RNG scope for random-search sampling.
const SAMPLER_SCOPE: &str = "random_search";

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    #[default]
    GridSearch,
    RandomSearch,
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMethod::GridSearch => f.write_str("grid_search"),
            SearchMethod::RandomSearch => f.write_str("random_search"),
        }
    }
}

/// Anti-overfitting thresholds a candidate must pass to be eligible.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Guardrails {
    pub min_trades: usize,
    /// Positive percentage, compared with `Metrics::max_drawdown_pct`.
    pub max_drawdown_pct: f64,
    /// Maximum share of net profit a single winning trade may contribute.
    pub lottery_trade_threshold: f64,
}

impl Default for Guardrails {
    fn default() -> Self {
        Self {
            min_trades: 5,
            max_drawdown_pct: 50.0,
            lottery_trade_threshold: 0.5,
        }
    }
}

/// Why a candidate was excluded from ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisqualifyReason {
    TooFewTrades { trades: usize, min: usize },
    DrawdownTooDeep { drawdown_pct: f64, cap_pct: f64 },
    LotteryTrade { share: f64, threshold: f64 },
}

impl fmt::Display for DisqualifyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewTrades { trades, min } => {
                write!(f, "too few trades ({trades} < {min})")
            }
            Self::DrawdownTooDeep { drawdown_pct, cap_pct } => {
                write!(f, "drawdown {drawdown_pct:.2}% exceeds cap {cap_pct:.2}%")
            }
            Self::LotteryTrade { share, threshold } => write!(
                f,
                "single trade is {:.1}% of net profit (limit {:.1}%)",
                share * 100.0,
                threshold * 100.0
            ),
        }
    }
}

impl Guardrails {
    /// First failing check, or `None` when the candidate is eligible.
    pub fn check(&self, metrics: &Metrics) -> Option<DisqualifyReason> {
        if metrics.total_trades < self.min_trades {
            return Some(DisqualifyReason::TooFewTrades {
                trades: metrics.total_trades,
                min: self.min_trades,
            });
        }
        if metrics.max_drawdown_pct > self.max_drawdown_pct {
            return Some(DisqualifyReason::DrawdownTooDeep {
                drawdown_pct: metrics.max_drawdown_pct,
                cap_pct: self.max_drawdown_pct,
            });
        }
        if let Some(share) = metrics.largest_win_share {
            if share > self.lottery_trade_threshold {
                return Some(DisqualifyReason::LotteryTrade {
                    share,
                    threshold: self.lottery_trade_threshold,
                });
            }
        }
        None
    }
}

/// Everything a search needs besides the space and the data.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub method: SearchMethod,
    pub metric: OptimizationMetric,
    /// Random search draw count.
    pub samples: usize,
    pub seed: u64,
    pub max_combinations: usize,
    pub guardrails: Guardrails,
    pub robust: RobustScoreConfig,
    pub settings: SimulationSettings,
    /// Worker threads; 0 uses rayon's default, 1 runs inline.
    pub threads: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            method: SearchMethod::GridSearch,
            metric: OptimizationMetric::SharpeLikeRatio,
            samples: 100,
            seed: 42,
            max_combinations: DEFAULT_MAX_COMBINATIONS,
            guardrails: Guardrails::default(),
            robust: RobustScoreConfig::default(),
            settings: SimulationSettings::default(),
            threads: 0,
        }
    }
}

// ─── Results ─────────────────────────────────────────────────────────

/// One evaluated candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    /// Full parameter set (base overlaid with the combination).
    pub params: ParameterSet,
    pub metrics: Metrics,
    pub objective: f64,
    pub disqualified: Option<DisqualifyReason>,
}

impl CandidateResult {
    pub fn is_eligible(&self) -> bool {
        self.disqualified.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Eligible candidates, best first.
    pub ranked: Vec<CandidateResult>,
    /// Guardrail failures, in enumeration order.
    pub disqualified: Vec<CandidateResult>,
    /// Combinations rejected by parameter validation (e.g. fast >= slow).
    pub skipped_invalid: usize,
}

impl SearchOutcome {
    pub fn best(&self) -> Option<&CandidateResult> {
        self.ranked.first()
    }

    pub fn evaluated(&self) -> usize {
        self.ranked.len() + self.disqualified.len()
    }

    /// Human-readable reason when nothing qualified.
    pub fn no_qualifier_reason(&self) -> String {
        if self.evaluated() == 0 {
            format!(
                "no qualifying parameters: no valid combinations ({} skipped)",
                self.skipped_invalid
            )
        } else {
            let first = self
                .disqualified
                .first()
                .and_then(|c| c.disqualified.as_ref())
                .map(|r| r.to_string())
                .unwrap_or_default();
            format!(
                "no qualifying parameters: all {} candidates disqualified (first: {first})",
                self.disqualified.len()
            )
        }
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Space(#[from] SpaceError),
    #[error("grid has {count} combinations, exceeding the limit of {max}")]
    TooManyCombinations { count: usize, max: usize },
    #[error("base parameters are invalid")]
    BaseParams(#[source] ParamError),
    #[error("candidate {params} is invalid")]
    CandidateParams {
        params: ParameterSet,
        #[source]
        source: ParamError,
    },
    #[error("simulation failed")]
    Simulation(#[from] SimulationError),
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
    #[error("search cancelled")]
    Cancelled,
}

// ─── Candidate generation ────────────────────────────────────────────

/// Combination indices to evaluate, in ascending order.
///
/// Grid search fails fast when the product exceeds `max_combinations`.
/// Random search draws `samples` distinct indices (all of them when the space
/// is smaller) from an RNG keyed on the seed and window index.
pub fn candidate_indices(
    space: &ParameterSpace,
    config: &SearchConfig,
    window_index: usize,
) -> Result<Vec<usize>, SearchError> {
    let size = space.size();
    match config.method {
        SearchMethod::GridSearch => {
            if size > config.max_combinations {
                return Err(SearchError::TooManyCombinations {
                    count: size,
                    max: config.max_combinations,
                });
            }
            Ok((0..size).collect())
        }
        SearchMethod::RandomSearch => {
            if config.samples >= size {
                return Ok((0..size).collect());
            }
            let mut rng = RngHierarchy::new(config.seed).rng_for(SAMPLER_SCOPE, window_index as u64);
            let mut picked = rand::seq::index::sample(&mut rng, size, config.samples).into_vec();
            picked.sort_unstable();
            Ok(picked)
        }
    }
}

/// Typed parameters for every candidate, skipping combinations that violate
/// parameter invariants.
fn build_candidates(
    space: &ParameterSpace,
    base: &ParameterSet,
    indices: &[usize],
) -> Result<(Vec<(ParameterSet, StrategyParams)>, usize), SearchError> {
    let mut out = Vec::with_capacity(indices.len());
    let mut skipped = 0;
    for &index in indices {
        let params = base.overlay(&space.combination(index));
        match StrategyParams::from_parameter_set(&params) {
            Ok(typed) => out.push((params, typed)),
            Err(e @ (ParamError::FastNotBelowSlow { .. } | ParamError::OutOfRange { .. })) => {
                debug!(%params, error = %e, "skipping invalid combination");
                skipped += 1;
            }
            Err(source) => return Err(SearchError::CandidateParams { params, source }),
        }
    }
    Ok((out, skipped))
}

// ─── Evaluation ──────────────────────────────────────────────────────

fn evaluate(
    candles: &[Candle],
    params: &ParameterSet,
    typed: &StrategyParams,
    config: &SearchConfig,
    cancel: &AtomicBool,
) -> Option<Result<CandidateResult, SimulationError>> {
    if cancel.load(AtomicOrdering::Relaxed) {
        return None;
    }
    let result = match simulate(candles, typed, &config.settings) {
        Ok(r) => r,
        Err(e) => return Some(Err(e)),
    };
    let metrics = Metrics::compute_with(
        &result.trades,
        &result.equity,
        config.settings.initial_balance,
        &config.robust,
    );
    let objective = config.metric.extract(&metrics);
    let disqualified = config.guardrails.check(&metrics);
    Some(Ok(CandidateResult {
        params: params.clone(),
        metrics,
        objective,
        disqualified,
    }))
}

/// Ranking order: objective descending, then trade count descending, then
/// ascending ParameterSet order.
pub fn rank_order(a: &CandidateResult, b: &CandidateResult) -> Ordering {
    b.objective
        .total_cmp(&a.objective)
        .then_with(|| b.metrics.total_trades.cmp(&a.metrics.total_trades))
        .then_with(|| a.params.cmp(&b.params))
}

/// Run a search over one training slice.
pub fn run_search(
    candles: &[Candle],
    space: &ParameterSpace,
    base: &ParameterSet,
    config: &SearchConfig,
    window_index: usize,
    cancel: &AtomicBool,
) -> Result<SearchOutcome, SearchError> {
    // Only base values no axis overrides are checked here; overridden ones
    // are validated per candidate in `build_candidates`.
    let fixed: ParameterSet = base
        .iter()
        .filter(|(name, _)| !space.names().any(|axis| axis == name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    StrategyParams::from_parameter_set(&fixed)
        .or_else(|e| match e {
            // Fixed values may violate fast < slow until overlaid.
            ParamError::FastNotBelowSlow { .. } => Ok(StrategyParams::default()),
            other => Err(other),
        })
        .map_err(SearchError::BaseParams)?;

    let indices = candidate_indices(space, config, window_index)?;
    let (candidates, skipped_invalid) = build_candidates(space, base, &indices)?;
    debug!(
        window = window_index,
        candidates = candidates.len(),
        skipped_invalid,
        method = %config.method,
        "evaluating candidates"
    );

    let run = |(params, typed): &(ParameterSet, StrategyParams)| {
        evaluate(candles, params, typed, config, cancel)
    };

    let evaluated: Vec<Option<Result<CandidateResult, SimulationError>>> = if config.threads == 1 {
        candidates.iter().map(run).collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("walkforge-search-{i}"))
            .build()
            .map_err(|e| SearchError::ThreadPool(e.to_string()))?;
        pool.install(|| candidates.par_iter().map(run).collect())
    };

    let mut ranked = Vec::new();
    let mut disqualified = Vec::new();
    for slot in evaluated {
        let Some(result) = slot else {
            return Err(SearchError::Cancelled);
        };
        let candidate = result?;
        if candidate.is_eligible() {
            ranked.push(candidate);
        } else {
            disqualified.push(candidate);
        }
    }
    ranked.sort_by(rank_order);

    Ok(SearchOutcome {
        ranked,
        disqualified,
        skipped_invalid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::test_support::{equity, trade};
    use crate::param_space::ParamRange;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use walkforge_core::ParamValue;

    fn metrics_with(pnls: &[f64]) -> Metrics {
        let trades: Vec<_> = pnls.iter().enumerate().map(|(i, &p)| trade(i as i64, p)).collect();
        Metrics::compute(&trades, &equity(1_000.0, &trades), 1_000.0)
    }

    fn int_space(axes: &[(&str, &[i64])]) -> ParameterSpace {
        let ranges: BTreeMap<String, ParamRange> = axes
            .iter()
            .map(|(name, values)| {
                (
                    name.to_string(),
                    ParamRange::Values(values.iter().copied().map(ParamValue::Int).collect()),
                )
            })
            .collect();
        ParameterSpace::new(&ranges).unwrap()
    }

    #[test]
    fn guardrail_min_trades() {
        let g = Guardrails {
            min_trades: 5,
            ..Guardrails::default()
        };
        let m = metrics_with(&[50.0, -10.0]);
        assert_eq!(
            g.check(&m),
            Some(DisqualifyReason::TooFewTrades { trades: 2, min: 5 })
        );
    }

    #[test]
    fn guardrail_lottery_trade() {
        let g = Guardrails {
            min_trades: 1,
            max_drawdown_pct: 100.0,
            lottery_trade_threshold: 0.5,
        };
        // Largest winner 300 of net 310.
        let m = metrics_with(&[300.0, 5.0, 5.0]);
        assert!(matches!(g.check(&m), Some(DisqualifyReason::LotteryTrade { .. })));

        let balanced = metrics_with(&[100.0, 100.0, 100.0]);
        assert_eq!(g.check(&balanced), None);
    }

    #[test]
    fn guardrail_lottery_skipped_when_unprofitable() {
        let g = Guardrails {
            min_trades: 1,
            max_drawdown_pct: 100.0,
            lottery_trade_threshold: 0.1,
        };
        let m = metrics_with(&[50.0, -100.0]);
        assert_eq!(g.check(&m), None);
    }

    #[test]
    fn guardrail_drawdown_cap() {
        let g = Guardrails {
            min_trades: 1,
            max_drawdown_pct: 10.0,
            lottery_trade_threshold: 1.0,
        };
        let m = metrics_with(&[100.0, -300.0, 400.0]);
        assert!(matches!(g.check(&m), Some(DisqualifyReason::DrawdownTooDeep { .. })));
    }

    #[test]
    fn grid_explosion_reports_count() {
        let space = int_space(&[("fast_period", &[1, 2, 3, 4]), ("slow_period", &[10, 20, 30])]);
        let config = SearchConfig {
            max_combinations: 10,
            ..SearchConfig::default()
        };
        match candidate_indices(&space, &config, 0) {
            Err(SearchError::TooManyCombinations { count, max }) => {
                assert_eq!(count, 12);
                assert_eq!(max, 10);
            }
            other => panic!("expected explosion error, got {other:?}"),
        }
    }

    #[test]
    fn random_search_is_reproducible_and_distinct() {
        let space = int_space(&[("fast_period", &[1, 2, 3, 4, 5, 6, 7, 8]), ("slow_period", &[10, 20, 30, 40, 50])]);
        let config = SearchConfig {
            method: SearchMethod::RandomSearch,
            samples: 12,
            seed: 7,
            ..SearchConfig::default()
        };
        let a = candidate_indices(&space, &config, 3).unwrap();
        let b = candidate_indices(&space, &config, 3).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
        let mut dedup = a.clone();
        dedup.dedup();
        assert_eq!(dedup.len(), 12);
        assert!(a.iter().all(|&i| i < space.size()));

        let other_window = candidate_indices(&space, &config, 4).unwrap();
        assert_ne!(a, other_window);
    }

    #[test]
    fn random_search_oversampling_uses_whole_space() {
        let space = int_space(&[("fast_period", &[1, 2, 3])]);
        let config = SearchConfig {
            method: SearchMethod::RandomSearch,
            samples: 50,
            ..SearchConfig::default()
        };
        assert_eq!(candidate_indices(&space, &config, 0).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn invalid_combinations_are_skipped_and_counted() {
        let space = int_space(&[("fast_period", &[5, 20, 30]), ("slow_period", &[10, 20])]);
        let (candidates, skipped) =
            build_candidates(&space, &ParameterSet::new(), &(0..space.size()).collect::<Vec<_>>())
                .unwrap();
        // valid: (5,10), (5,20)
        assert_eq!(candidates.len(), 2);
        assert_eq!(skipped, 4);
    }

    #[test]
    fn unknown_parameter_is_an_error_not_a_skip() {
        let space = int_space(&[("rsi_period", &[14])]);
        let err = build_candidates(&space, &ParameterSet::new(), &[0]).unwrap_err();
        assert!(matches!(err, SearchError::CandidateParams { .. }));
    }

    /// Closes climbing +10, +10, −1 per cycle. With SMA(1)/SMA(2) every dip is
    /// a death cross and the next rise a golden cross: longs win every cycle,
    /// shorts lose every cycle.
    fn stair_candles() -> Vec<Candle> {
        let closes = [
            100.0, 110.0, 120.0, 119.0, 129.0, 139.0, 138.0, 148.0, 158.0, 157.0, 167.0, 177.0,
            176.0,
        ];
        let t0 = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle {
                open_time: t0 + chrono::Duration::hours(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1.0,
            })
            .collect()
    }

    fn stair_base() -> ParameterSet {
        ParameterSet::new()
            .with("ma_type", "sma")
            .with("fast_period", 1i64)
            .with("slow_period", 2i64)
            .with("take_profit_pct", 0.0)
            .with("stop_loss_pct", 0.0)
    }

    fn stair_config(min_trades: usize) -> SearchConfig {
        SearchConfig {
            metric: OptimizationMetric::TotalReturnPct,
            guardrails: Guardrails {
                min_trades,
                max_drawdown_pct: 100.0,
                lottery_trade_threshold: 1.0,
            },
            settings: SimulationSettings {
                initial_balance: 1_000.0,
                fee_rate: 0.0,
                ..SimulationSettings::default()
            },
            threads: 1,
            ..SearchConfig::default()
        }
    }

    fn short_axis() -> ParameterSpace {
        let ranges = BTreeMap::from([(
            "enable_short".to_string(),
            ParamRange::Values(vec![ParamValue::Bool(false), ParamValue::Bool(true)]),
        )]);
        ParameterSpace::new(&ranges).unwrap()
    }

    #[test]
    fn best_raw_candidate_with_too_few_trades_is_never_ranked() {
        let candles = stair_candles();
        let space = short_axis();
        let cancel = AtomicBool::new(false);

        // Permissive guardrails: long-only wins on return with fewer trades.
        let open = run_search(&candles, &space, &stair_base(), &stair_config(1), 0, &cancel).unwrap();
        let best = open.best().unwrap();
        assert_eq!(best.params.get("enable_short"), Some(&ParamValue::Bool(false)));
        assert_eq!(best.metrics.total_trades, 3);
        assert_eq!(open.ranked[1].metrics.total_trades, 6);
        assert!(open.ranked[1].objective < best.objective);

        let strict = run_search(&candles, &space, &stair_base(), &stair_config(5), 0, &cancel).unwrap();
        assert_eq!(strict.ranked.len(), 1);
        assert_eq!(
            strict.best().unwrap().params.get("enable_short"),
            Some(&ParamValue::Bool(true))
        );
        assert_eq!(strict.disqualified.len(), 1);
        let excluded = &strict.disqualified[0];
        assert_eq!(excluded.params.get("enable_short"), Some(&ParamValue::Bool(false)));
        assert_eq!(
            excluded.disqualified,
            Some(DisqualifyReason::TooFewTrades { trades: 3, min: 5 })
        );
        assert!(excluded.objective > strict.best().unwrap().objective);
    }

    #[test]
    fn base_values_overridden_by_an_axis_are_not_validated_alone() {
        let candles = stair_candles();
        let cancel = AtomicBool::new(false);
        let base = stair_base().with("enable_short", "maybe");
        let outcome = run_search(&candles, &short_axis(), &base, &stair_config(1), 0, &cancel).unwrap();
        assert_eq!(outcome.evaluated(), 2);

        let space = int_space(&[("cooldown_candles", &[0, 1])]);
        let base = stair_base().with("stop_loss_pct", -1.0);
        let err = run_search(&candles, &space, &base, &stair_config(1), 0, &cancel).unwrap_err();
        assert!(matches!(err, SearchError::BaseParams(ParamError::OutOfRange { .. })));

        let overridden = ParameterSpace::new(&BTreeMap::from([(
            "stop_loss_pct".to_string(),
            ParamRange::Values(vec![ParamValue::Float(0.0)]),
        )]))
        .unwrap();
        let outcome = run_search(&candles, &overridden, &base, &stair_config(1), 0, &cancel).unwrap();
        assert_eq!(outcome.evaluated(), 1);
    }

    #[test]
    fn huge_range_fails_fast_with_count() {
        let ranges = BTreeMap::from([(
            "fast_period".to_string(),
            ParamRange::Range {
                min: ParamValue::Int(1),
                max: ParamValue::Int(1_000_000_000),
                step: ParamValue::Int(1),
            },
        )]);
        let space = ParameterSpace::new(&ranges).unwrap();
        match candidate_indices(&space, &SearchConfig::default(), 0) {
            Err(SearchError::TooManyCombinations { count, .. }) => assert_eq!(count, 1_000_000_000),
            other => panic!("expected explosion error, got {other:?}"),
        }
    }

    #[test]
    fn ties_break_on_trades_then_params() {
        let make = |fast: i64, trades: usize, objective: f64| {
            let mut metrics = Metrics::empty(1_000.0);
            metrics.total_trades = trades;
            CandidateResult {
                params: ParameterSet::new().with("fast_period", fast),
                metrics,
                objective,
                disqualified: None,
            }
        };
        let mut list = vec![make(9, 10, 1.0), make(7, 10, 1.0), make(3, 12, 1.0), make(1, 5, 2.0)];
        list.sort_by(rank_order);
        let order: Vec<String> = list.iter().map(|c| c.params.to_string()).collect();
        assert_eq!(
            order,
            vec!["fast_period=1", "fast_period=3", "fast_period=7", "fast_period=9"]
        );
    }
}
