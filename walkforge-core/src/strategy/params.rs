//! Typed strategy parameters — the validated view of a `ParameterSet`.
//!
//! Percentages are fractions: `0.01` means one percent.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ParamValue, ParameterSet};
use crate::indicators::MaType;

/// Every parameter name the crossover strategy understands.
pub const KNOWN_PARAMS: &[&str] = &[
    "ma_type",
    "fast_period",
    "slow_period",
    "take_profit_pct",
    "stop_loss_pct",
    "cooldown_candles",
    "enable_short",
    "trailing_stop_enabled",
    "trailing_activation_pct",
    "trailing_distance_pct",
    "htf_bias_enabled",
    "htf_multiplier",
    "htf_ema_period",
    "min_separation_pct",
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("unknown parameter `{0}`")]
    Unknown(String),
    #[error("parameter `{name}` expects {expected}, got {actual} ({value})")]
    WrongType {
        name: String,
        expected: &'static str,
        actual: &'static str,
        value: String,
    },
    #[error("parameter `{name}` out of range: {reason}")]
    OutOfRange { name: String, reason: String },
    #[error("fast_period ({fast}) must be < slow_period ({slow})")]
    FastNotBelowSlow { fast: usize, slow: usize },
}

/// Moving-average crossover strategy parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    pub ma_type: MaType,
    pub fast_period: usize,
    pub slow_period: usize,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub cooldown_candles: usize,
    pub enable_short: bool,
    pub trailing_stop_enabled: bool,
    pub trailing_activation_pct: f64,
    pub trailing_distance_pct: f64,
    pub htf_bias_enabled: bool,
    pub htf_multiplier: usize,
    pub htf_ema_period: usize,
    pub min_separation_pct: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            ma_type: MaType::Ema,
            fast_period: 9,
            slow_period: 21,
            take_profit_pct: 0.03,
            stop_loss_pct: 0.015,
            cooldown_candles: 0,
            enable_short: false,
            trailing_stop_enabled: false,
            trailing_activation_pct: 0.01,
            trailing_distance_pct: 0.005,
            htf_bias_enabled: false,
            htf_multiplier: 4,
            htf_ema_period: 21,
            min_separation_pct: 0.0,
        }
    }
}

impl StrategyParams {
    /// Defaults overridden by every entry in `set`, then validated.
    pub fn from_parameter_set(set: &ParameterSet) -> Result<Self, ParamError> {
        let mut params = Self::default();
        for (name, value) in set.iter() {
            match name.as_str() {
                "ma_type" => {
                    let raw = expect_str(name, value)?;
                    params.ma_type =
                        MaType::parse(raw).ok_or_else(|| ParamError::OutOfRange {
                            name: name.clone(),
                            reason: format!("unknown moving average `{raw}` (ema|sma)"),
                        })?;
                }
                "fast_period" => params.fast_period = expect_count(name, value)?,
                "slow_period" => params.slow_period = expect_count(name, value)?,
                "take_profit_pct" => params.take_profit_pct = expect_pct(name, value)?,
                "stop_loss_pct" => params.stop_loss_pct = expect_pct(name, value)?,
                "cooldown_candles" => params.cooldown_candles = expect_count(name, value)?,
                "enable_short" => params.enable_short = expect_bool(name, value)?,
                "trailing_stop_enabled" => params.trailing_stop_enabled = expect_bool(name, value)?,
                "trailing_activation_pct" => {
                    params.trailing_activation_pct = expect_pct(name, value)?
                }
                "trailing_distance_pct" => params.trailing_distance_pct = expect_pct(name, value)?,
                "htf_bias_enabled" => params.htf_bias_enabled = expect_bool(name, value)?,
                "htf_multiplier" => params.htf_multiplier = expect_count(name, value)?,
                "htf_ema_period" => params.htf_ema_period = expect_count(name, value)?,
                "min_separation_pct" => params.min_separation_pct = expect_pct(name, value)?,
                other => return Err(ParamError::Unknown(other.to_string())),
            }
        }
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        if self.fast_period == 0 {
            return Err(out_of_range("fast_period", "must be >= 1"));
        }
        if self.fast_period >= self.slow_period {
            return Err(ParamError::FastNotBelowSlow {
                fast: self.fast_period,
                slow: self.slow_period,
            });
        }
        if self.trailing_stop_enabled && self.trailing_distance_pct <= 0.0 {
            return Err(out_of_range(
                "trailing_distance_pct",
                "must be > 0 when the trailing stop is enabled",
            ));
        }
        if self.htf_bias_enabled {
            if self.htf_multiplier < 2 {
                return Err(out_of_range("htf_multiplier", "must be >= 2"));
            }
            if self.htf_ema_period == 0 {
                return Err(out_of_range("htf_ema_period", "must be >= 1"));
            }
        }
        Ok(())
    }

    /// Candles needed before the first crossover can be evaluated.
    pub fn warmup_candles(&self) -> usize {
        self.slow_period
    }

    /// Round-trip back to a fully populated `ParameterSet`.
    pub fn to_parameter_set(&self) -> ParameterSet {
        ParameterSet::new()
            .with("ma_type", self.ma_type.as_str())
            .with("fast_period", self.fast_period as i64)
            .with("slow_period", self.slow_period as i64)
            .with("take_profit_pct", self.take_profit_pct)
            .with("stop_loss_pct", self.stop_loss_pct)
            .with("cooldown_candles", self.cooldown_candles as i64)
            .with("enable_short", self.enable_short)
            .with("trailing_stop_enabled", self.trailing_stop_enabled)
            .with("trailing_activation_pct", self.trailing_activation_pct)
            .with("trailing_distance_pct", self.trailing_distance_pct)
            .with("htf_bias_enabled", self.htf_bias_enabled)
            .with("htf_multiplier", self.htf_multiplier as i64)
            .with("htf_ema_period", self.htf_ema_period as i64)
            .with("min_separation_pct", self.min_separation_pct)
    }
}

fn out_of_range(name: &str, reason: &str) -> ParamError {
    ParamError::OutOfRange {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn wrong_type(name: &str, expected: &'static str, value: &ParamValue) -> ParamError {
    ParamError::WrongType {
        name: name.to_string(),
        expected,
        actual: value.type_name(),
        value: value.to_string(),
    }
}

fn expect_count(name: &str, value: &ParamValue) -> Result<usize, ParamError> {
    let v = value
        .as_i64()
        .ok_or_else(|| wrong_type(name, "int", value))?;
    usize::try_from(v).map_err(|_| out_of_range(name, "must be >= 0"))
}

fn expect_pct(name: &str, value: &ParamValue) -> Result<f64, ParamError> {
    let v = value
        .as_f64()
        .ok_or_else(|| wrong_type(name, "float", value))?;
    if !v.is_finite() || v < 0.0 {
        return Err(out_of_range(name, "must be a finite value >= 0"));
    }
    Ok(v)
}

fn expect_bool(name: &str, value: &ParamValue) -> Result<bool, ParamError> {
    value.as_bool().ok_or_else(|| wrong_type(name, "bool", value))
}

fn expect_str<'a>(name: &str, value: &'a ParamValue) -> Result<&'a str, ParamError> {
    value.as_str().ok_or_else(|| wrong_type(name, "string", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_yields_defaults() {
        let params = StrategyParams::from_parameter_set(&ParameterSet::new()).unwrap();
        assert_eq!(params, StrategyParams::default());
    }

    #[test]
    fn overrides_apply() {
        let set = ParameterSet::new()
            .with("fast_period", 5i64)
            .with("slow_period", 30i64)
            .with("take_profit_pct", 0.02)
            .with("enable_short", true)
            .with("ma_type", "sma");
        let params = StrategyParams::from_parameter_set(&set).unwrap();
        assert_eq!(params.fast_period, 5);
        assert_eq!(params.slow_period, 30);
        assert_eq!(params.take_profit_pct, 0.02);
        assert!(params.enable_short);
        assert_eq!(params.ma_type, MaType::Sma);
    }

    #[test]
    fn int_accepted_for_percentage() {
        let set = ParameterSet::new().with("min_separation_pct", 0i64);
        let params = StrategyParams::from_parameter_set(&set).unwrap();
        assert_eq!(params.min_separation_pct, 0.0);
    }

    #[test]
    fn fast_must_be_below_slow() {
        let set = ParameterSet::new()
            .with("fast_period", 21i64)
            .with("slow_period", 21i64);
        assert_eq!(
            StrategyParams::from_parameter_set(&set).unwrap_err(),
            ParamError::FastNotBelowSlow { fast: 21, slow: 21 }
        );
    }

    #[test]
    fn negative_percentage_rejected() {
        let set = ParameterSet::new().with("stop_loss_pct", -0.01);
        assert!(matches!(
            StrategyParams::from_parameter_set(&set),
            Err(ParamError::OutOfRange { .. })
        ));
    }

    #[test]
    fn unknown_and_mistyped_parameters_rejected() {
        let unknown = ParameterSet::new().with("rsi_period", 14i64);
        assert_eq!(
            StrategyParams::from_parameter_set(&unknown).unwrap_err(),
            ParamError::Unknown("rsi_period".into())
        );

        let mistyped = ParameterSet::new().with("enable_short", 1i64);
        assert!(matches!(
            StrategyParams::from_parameter_set(&mistyped),
            Err(ParamError::WrongType { .. })
        ));
    }

    #[test]
    fn to_parameter_set_round_trips() {
        let params = StrategyParams {
            fast_period: 7,
            slow_period: 40,
            enable_short: true,
            ..StrategyParams::default()
        };
        let back = StrategyParams::from_parameter_set(&params.to_parameter_set()).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn every_known_param_is_accepted() {
        let set = StrategyParams::default().to_parameter_set();
        assert_eq!(set.len(), KNOWN_PARAMS.len());
        for (name, _) in set.iter() {
            assert!(KNOWN_PARAMS.contains(&name.as_str()));
        }
    }
}
