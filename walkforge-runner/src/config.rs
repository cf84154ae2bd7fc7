//! Serializable walk-forward run request.
//!
//! Loaded from TOML; timestamps are RFC 3339 strings:
//!
//! ```toml
//! symbol = "BTCUSDT"
//! start = "2024-01-01T00:00:00Z"
//! end = "2024-03-01T00:00:00Z"
//! training_days = 14
//! test_days = 7
//! step_days = 7
//! metric = "robust_score"
//!
//! [param_ranges]
//! fast_period = [5, 9, 13]
//! slow_period = { min = 20, max = 40, step = 10 }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use walkforge_core::strategy::KNOWN_PARAMS;
use walkforge_core::{ParameterSet, SimulationError, SimulationSettings, StrategyKind};

use crate::fitness::OptimizationMetric;
use crate::metrics::RobustScoreConfig;
use crate::param_space::{ParamRange, ParameterSpace, SpaceError};
use crate::schedule::{ScheduleSpec, WindowType};
use crate::search::{Guardrails, SearchConfig, SearchMethod, DEFAULT_MAX_COMBINATIONS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config TOML")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error(transparent)]
    Space(#[from] SpaceError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

/// Everything needed to reproduce one walk-forward run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    pub symbol: String,
    #[serde(default)]
    pub strategy: StrategyKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub training_days: i64,
    pub test_days: i64,
    pub step_days: i64,
    #[serde(default)]
    pub window_type: WindowType,

    /// Fixed parameters every candidate starts from.
    #[serde(default)]
    pub base_params: ParameterSet,
    #[serde(default)]
    pub param_ranges: BTreeMap<String, ParamRange>,

    #[serde(default)]
    pub metric: OptimizationMetric,
    #[serde(default)]
    pub method: SearchMethod,
    #[serde(default = "default_samples")]
    pub samples: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_max_combinations")]
    pub max_combinations: usize,

    #[serde(default)]
    pub guardrails: Guardrails,
    #[serde(default)]
    pub simulation: SimulationSettings,
    #[serde(default)]
    pub robust_score: RobustScoreConfig,

    /// Search worker threads; 0 = one per core.
    #[serde(default)]
    pub threads: usize,
    /// Keep per-window test trades in the result.
    #[serde(default = "default_true")]
    pub include_trades: bool,
}

fn default_samples() -> usize {
    100
}

fn default_seed() -> u64 {
    42
}

fn default_max_combinations() -> usize {
    DEFAULT_MAX_COMBINATIONS
}

fn default_true() -> bool {
    true
}

impl WalkForwardConfig {
    /// Minimal config with every optional field at its default.
    pub fn new(symbol: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            strategy: StrategyKind::default(),
            start,
            end,
            training_days: 14,
            test_days: 7,
            step_days: 7,
            window_type: WindowType::default(),
            base_params: ParameterSet::new(),
            param_ranges: BTreeMap::new(),
            metric: OptimizationMetric::default(),
            method: SearchMethod::default(),
            samples: default_samples(),
            seed: default_seed(),
            max_combinations: DEFAULT_MAX_COMBINATIONS,
            guardrails: Guardrails::default(),
            simulation: SimulationSettings::default(),
            robust_score: RobustScoreConfig::default(),
            threads: 0,
            include_trades: true,
        }
    }

    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Check everything that can be checked before touching data.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::Invalid("symbol must not be empty".into()));
        }
        if self.symbol.contains(['/', '\\']) || self.symbol.contains("..") {
            return Err(ConfigError::Invalid(format!(
                "symbol `{}` must not contain path separators",
                self.symbol
            )));
        }
        if self.end <= self.start {
            return Err(ConfigError::Invalid(format!(
                "end {} must be after start {}",
                self.end, self.start
            )));
        }
        for (name, days) in [
            ("training_days", self.training_days),
            ("test_days", self.test_days),
            ("step_days", self.step_days),
        ] {
            if days <= 0 {
                return Err(ConfigError::Invalid(format!("{name} must be > 0")));
            }
        }

        let unknown = self
            .base_params
            .iter()
            .map(|(name, _)| name.as_str())
            .chain(self.param_ranges.keys().map(String::as_str))
            .find(|name| !KNOWN_PARAMS.contains(name));
        if let Some(name) = unknown {
            return Err(ConfigError::Invalid(format!(
                "unknown parameter `{name}` for strategy {}",
                self.strategy
            )));
        }

        let space = ParameterSpace::new(&self.param_ranges)?;
        match self.method {
            SearchMethod::GridSearch if space.size() > self.max_combinations => {
                return Err(ConfigError::Invalid(format!(
                    "grid has {} combinations, exceeding max_combinations = {}",
                    space.size(),
                    self.max_combinations
                )));
            }
            SearchMethod::RandomSearch if self.samples == 0 => {
                return Err(ConfigError::Invalid("samples must be > 0".into()));
            }
            _ => {}
        }

        if self.guardrails.max_drawdown_pct <= 0.0 {
            return Err(ConfigError::Invalid(
                "guardrails.max_drawdown_pct must be > 0".into(),
            ));
        }
        if self.guardrails.lottery_trade_threshold <= 0.0 {
            return Err(ConfigError::Invalid(
                "guardrails.lottery_trade_threshold must be > 0".into(),
            ));
        }
        self.simulation.validate()?;
        Ok(())
    }

    pub fn schedule_spec(&self) -> ScheduleSpec {
        ScheduleSpec::from_days(
            self.start,
            self.end,
            self.training_days,
            self.test_days,
            self.step_days,
            self.window_type,
        )
    }

    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            method: self.method,
            metric: self.metric,
            samples: self.samples,
            seed: self.seed,
            max_combinations: self.max_combinations,
            guardrails: self.guardrails,
            robust: self.robust_score,
            settings: self.simulation.clone(),
            threads: self.threads,
        }
    }

    /// BLAKE3 hex digest of the canonical JSON form; identifies a run request.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}
