//! Fitness function — configurable metric selector for candidate ranking.

use crate::metrics::Metrics;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Profit factor used for ranking when there were no losing trades.
pub const PROFIT_FACTOR_CAP: f64 = 100.0;

/// Which metric to optimize/sort by. Higher is always better.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationMetric {
    #[default]
    SharpeLikeRatio,
    RobustScore,
    TotalReturnPct,
    WinRate,
    ProfitFactor,
}

impl OptimizationMetric {
    pub const ALL: [OptimizationMetric; 5] = [
        Self::SharpeLikeRatio,
        Self::RobustScore,
        Self::TotalReturnPct,
        Self::WinRate,
        Self::ProfitFactor,
    ];

    /// Extract the objective value from a Metrics struct.
    ///
    /// A missing profit factor counts as [`PROFIT_FACTOR_CAP`] when the slice
    /// made a gross profit and 0 otherwise.
    pub fn extract(&self, metrics: &Metrics) -> f64 {
        match self {
            Self::SharpeLikeRatio => metrics.sharpe_like_ratio,
            Self::RobustScore => metrics.robust_score,
            Self::TotalReturnPct => metrics.total_return_pct,
            Self::WinRate => metrics.win_rate,
            Self::ProfitFactor => match metrics.profit_factor {
                Some(pf) => pf.min(PROFIT_FACTOR_CAP),
                None if metrics.gross_profit_usd > 0.0 => PROFIT_FACTOR_CAP,
                None => 0.0,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SharpeLikeRatio => "sharpe_like_ratio",
            Self::RobustScore => "robust_score",
            Self::TotalReturnPct => "total_return_pct",
            Self::WinRate => "win_rate",
            Self::ProfitFactor => "profit_factor",
        }
    }

    /// Sign of the objective relative to a neutral outcome.
    ///
    /// Win rate and profit factor are centred on 0.5 and 1.0 respectively so
    /// that "worse than a coin flip" reads as negative.
    pub fn signum(&self, value: f64) -> i8 {
        let neutral = match self {
            Self::WinRate => 0.5,
            Self::ProfitFactor => 1.0,
            _ => 0.0,
        };
        if value > neutral {
            1
        } else if value < neutral {
            -1
        } else {
            0
        }
    }
}

impl fmt::Display for OptimizationMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
