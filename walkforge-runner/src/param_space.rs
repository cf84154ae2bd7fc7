//! Parameter space — the discrete axes a search walks over.
//!
//! Each named axis is either an explicit value list or a numeric
//! `{min, max, step}` range. Axes are kept in name order so a combination
//! index decodes to the same ParameterSet on every machine: the index is a
//! mixed-radix number whose last axis varies fastest.
//!
//! Range axes are never materialized. Their length is computed up front and
//! values are produced on demand, so an oversized grid is rejected by its
//! count before anything is allocated.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use walkforge_core::{ParamValue, ParameterSet};

/// Upper bound on the number of values a single range axis may describe.
pub const MAX_AXIS_VALUES: usize = u32::MAX as usize;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpaceError {
    #[error("parameter `{0}` has no candidate values")]
    EmptyAxis(String),
    #[error("parameter `{name}` range is invalid: {reason}")]
    InvalidRange { name: String, reason: String },
    #[error("parameter `{name}` range has {count} values, exceeding the per-axis limit of {max}")]
    AxisTooLarge { name: String, count: u128, max: usize },
}

/// One axis of the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamRange {
    Values(Vec<ParamValue>),
    Range {
        min: ParamValue,
        max: ParamValue,
        step: ParamValue,
    },
}

impl ParamRange {
    /// Resolve to an indexable axis, in ascending order for ranges.
    ///
    /// Integer bounds and step give integer values; anything else gives floats.
    pub fn axis(&self, name: &str) -> Result<AxisValues, SpaceError> {
        match self {
            ParamRange::Values(values) => {
                if values.is_empty() {
                    return Err(SpaceError::EmptyAxis(name.to_string()));
                }
                Ok(AxisValues::List(values.clone()))
            }
            ParamRange::Range { min, max, step } => range_axis(name, min, max, step),
        }
    }
}

/// Candidate values of one axis, indexed lazily.
#[derive(Debug, Clone, PartialEq)]
pub enum AxisValues {
    List(Vec<ParamValue>),
    Int { start: i64, step: i64, len: usize },
    Float { start: f64, step: f64, len: usize },
}

impl AxisValues {
    pub fn len(&self) -> usize {
        match self {
            AxisValues::List(values) => values.len(),
            AxisValues::Int { len, .. } | AxisValues::Float { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at position `i` (must be `< len()`).
    pub fn value_at(&self, i: usize) -> ParamValue {
        match self {
            AxisValues::List(values) => values[i].clone(),
            AxisValues::Int { start, step, .. } => {
                // Stays within [min, max], so the narrowing cast is exact.
                ParamValue::Int((*start as i128 + *step as i128 * i as i128) as i64)
            }
            AxisValues::Float { start, step, .. } => {
                let v = start + step * i as f64;
                let rounded = (v * 1e10).round() / 1e10;
                ParamValue::Float(if rounded.is_finite() { rounded } else { v })
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = ParamValue> + '_ {
        (0..self.len()).map(move |i| self.value_at(i))
    }
}

fn range_axis(
    name: &str,
    min: &ParamValue,
    max: &ParamValue,
    step: &ParamValue,
) -> Result<AxisValues, SpaceError> {
    let invalid = |reason: &str| SpaceError::InvalidRange {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    let too_large = |count: u128| SpaceError::AxisTooLarge {
        name: name.to_string(),
        count,
        max: MAX_AXIS_VALUES,
    };

    if let (ParamValue::Int(lo), ParamValue::Int(hi), ParamValue::Int(step)) = (min, max, step) {
        if *step <= 0 {
            return Err(invalid("step must be > 0"));
        }
        if lo > hi {
            return Err(invalid("min must be <= max"));
        }
        let count = ((*hi as i128 - *lo as i128) / *step as i128 + 1) as u128;
        if count > MAX_AXIS_VALUES as u128 {
            return Err(too_large(count));
        }
        return Ok(AxisValues::Int {
            start: *lo,
            step: *step,
            len: count as usize,
        });
    }

    let (Some(lo), Some(hi), Some(step)) = (min.as_f64(), max.as_f64(), step.as_f64()) else {
        return Err(invalid("min, max and step must be numeric"));
    };
    if !(step.is_finite() && step > 0.0) {
        return Err(invalid("step must be > 0"));
    }
    if !(lo.is_finite() && hi.is_finite()) || lo > hi {
        return Err(invalid("min must be <= max"));
    }
    // Tolerance keeps `max` itself when (max - min) / step is integral.
    let steps = ((hi - lo) / step + 1e-9).floor();
    if !steps.is_finite() {
        return Err(too_large(u128::MAX));
    }
    // Float-to-int casts saturate.
    let count = (steps as u128).saturating_add(1);
    if count > MAX_AXIS_VALUES as u128 {
        return Err(too_large(count));
    }
    Ok(AxisValues::Float {
        start: lo,
        step,
        len: count as usize,
    })
}

/// Named axes; range axes stay lazy.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpace {
    axes: Vec<(String, AxisValues)>,
}

impl ParameterSpace {
    pub fn new(ranges: &BTreeMap<String, ParamRange>) -> Result<Self, SpaceError> {
        let axes = ranges
            .iter()
            .map(|(name, range)| Ok((name.clone(), range.axis(name)?)))
            .collect::<Result<Vec<_>, SpaceError>>()?;
        Ok(Self { axes })
    }

    pub fn axes(&self) -> &[(String, AxisValues)] {
        &self.axes
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.axes.iter().map(|(name, _)| name.as_str())
    }

    /// Cartesian product size; saturates instead of overflowing.
    ///
    /// An empty space has exactly one combination: the base parameters.
    pub fn size(&self) -> usize {
        self.axes
            .iter()
            .try_fold(1usize, |acc, (_, values)| acc.checked_mul(values.len()))
            .unwrap_or(usize::MAX)
    }

    /// Decode combination `index` (must be `< size()`).
    pub fn combination(&self, mut index: usize) -> ParameterSet {
        let mut digits = vec![0usize; self.axes.len()];
        for (slot, (_, values)) in digits.iter_mut().zip(&self.axes).rev() {
            *slot = index % values.len();
            index /= values.len();
        }
        self.axes
            .iter()
            .zip(digits)
            .map(|((name, values), digit)| (name.clone(), values.value_at(digit)))
            .collect()
    }

    /// All combinations in enumeration order.
    pub fn iter(&self) -> impl Iterator<Item = ParameterSet> + '_ {
        (0..self.size()).map(move |i| self.combination(i))
    }
}
