//! WalkForge Runner — parameter search, walk-forward orchestration, metrics.
//!
//! This crate builds on `walkforge-core` to provide:
//! - Performance metrics and the optimization metric selector
//! - Parameter spaces with grid / random search and guardrails
//! - The rolling / expanding window scheduler
//! - The walk-forward orchestrator with background tasks and cancellation
//! - TOML run configuration, CSV candle loading, and result export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod fitness;
pub mod metrics;
pub mod param_space;
pub mod schedule;
pub mod search;
pub mod task;
pub mod walk_forward;

pub use config::{ConfigError, WalkForwardConfig};
pub use data_loader::{load_candles_csv, load_candles_in_range, read_candles, LoadError};
pub use fitness::OptimizationMetric;
pub use metrics::{Metrics, RobustScoreConfig};
pub use param_space::{AxisValues, ParamRange, ParameterSpace, SpaceError};
pub use schedule::{schedule_windows, ScheduleError, ScheduleSpec, Window, WindowType};
pub use search::{
    run_search, CandidateResult, DisqualifyReason, Guardrails, SearchConfig, SearchError,
    SearchMethod, SearchOutcome,
};
pub use task::{spawn_walk_forward, ProgressEvent, Task, TaskHandle, TaskStatus};
pub use walk_forward::{
    run_walk_forward, DegradationFlag, OverfittingRisk, RunControl, WalkForwardError,
    WalkForwardResult, WalkForwardSummary, WindowResult,
};
