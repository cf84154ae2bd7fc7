//! Strategy definitions: the moving-average crossover and its entry filters.

pub mod filters;
pub mod params;

pub use filters::{evaluate_entry, separation_ok, FilterVerdict, HtfTrend};
pub use params::{ParamError, StrategyParams, KNOWN_PARAMS};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Strategy family a run is configured for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    MaCrossover,
}

impl StrategyKind {
    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::MaCrossover => "ma_crossover",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Crossover detected between two consecutive candles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cross {
    /// Fast moved from at-or-below slow to strictly above.
    Golden,
    /// Fast moved from at-or-above slow to strictly below.
    Death,
}

impl Cross {
    /// Compare the previous pair against the current one.
    pub fn detect(prev_fast: f64, prev_slow: f64, fast: f64, slow: f64) -> Option<Cross> {
        if prev_fast <= prev_slow && fast > slow {
            Some(Cross::Golden)
        } else if prev_fast >= prev_slow && fast < slow {
            Some(Cross::Death)
        } else {
            None
        }
    }
}
