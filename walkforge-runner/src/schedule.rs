//! Window scheduler — partitions a date range into (train, test) pairs.
//!
//! Rolling windows slide the training start forward by `step`; expanding
//! windows keep it pinned at the range start and grow the training end by
//! `step`. The test slice always begins exactly where training ends.
//!
//! A window is emitted while its test slice starts before the range end. The
//! test slice of the final window is clipped at the range end and scheduling
//! stops there.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    #[default]
    Rolling,
    Expanding,
}

impl fmt::Display for WindowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowType::Rolling => f.write_str("rolling"),
            WindowType::Expanding => f.write_str("expanding"),
        }
    }
}

/// One train/test pair. All bounds are half-open: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub index: usize,
    pub train_start: DateTime<Utc>,
    pub train_end: DateTime<Utc>,
    pub test_start: DateTime<Utc>,
    pub test_end: DateTime<Utc>,
}

impl Window {
    pub fn train_length(&self) -> Duration {
        self.train_end - self.train_start
    }

    pub fn test_length(&self) -> Duration {
        self.test_end - self.test_start
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    #[error("{name} must be positive")]
    NonPositivePeriod { name: &'static str },
    #[error("range end {end} is not after start {start}")]
    EmptyRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Scheduling inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleSpec {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub training: Duration,
    pub test: Duration,
    pub step: Duration,
    pub window_type: WindowType,
}

impl ScheduleSpec {
    /// Convenience constructor for whole-day periods.
    pub fn from_days(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        training_days: i64,
        test_days: i64,
        step_days: i64,
        window_type: WindowType,
    ) -> Self {
        Self {
            start,
            end,
            training: Duration::days(training_days),
            test: Duration::days(test_days),
            step: Duration::days(step_days),
            window_type,
        }
    }
}

/// Produce the ordered window list.
///
/// Returns an empty list when one training period plus one test period does
/// not fit in the range.
pub fn schedule_windows(spec: &ScheduleSpec) -> Result<Vec<Window>, ScheduleError> {
    for (name, period) in [
        ("training period", spec.training),
        ("test period", spec.test),
        ("step size", spec.step),
    ] {
        if period <= Duration::zero() {
            return Err(ScheduleError::NonPositivePeriod { name });
        }
    }
    if spec.end <= spec.start {
        return Err(ScheduleError::EmptyRange {
            start: spec.start,
            end: spec.end,
        });
    }
    if spec.training + spec.test > spec.end - spec.start {
        return Ok(Vec::new());
    }

    let mut windows = Vec::new();
    for index in 0.. {
        let offset = spec.step * index as i32;
        let (train_start, train_end) = match spec.window_type {
            WindowType::Rolling => {
                let s = spec.start + offset;
                (s, s + spec.training)
            }
            WindowType::Expanding => (spec.start, spec.start + spec.training + offset),
        };
        let test_start = train_end;
        if test_start >= spec.end {
            break;
        }
        let full_end = test_start + spec.test;
        let test_end = full_end.min(spec.end);
        windows.push(Window {
            index,
            train_start,
            train_end,
            test_start,
            test_end,
        });
        if full_end >= spec.end {
            break;
        }
    }
    Ok(windows)
}
