//! WalkForge Core — candle data, parameter sets, streaming indicators and the
//! strategy simulator.
//!
//! This crate contains the deterministic heart of the engine:
//! - Domain types (candles, parameter sets, trades, position state)
//! - Streaming EMA/SMA indicators fed one close at a time
//! - Typed crossover strategy parameters and entry filters
//! - The pure bar-by-bar simulator (`step` / `simulate`)
//! - A BLAKE3-keyed RNG hierarchy for reproducible sampling

pub mod domain;
pub mod indicators;
pub mod rng;
pub mod simulator;
pub mod strategy;

pub use domain::{
    Candle, CandleError, CandleSeries, EquityPoint, ExitReason, OpenTrade, ParamValue,
    ParameterSet, PositionState, Side, Trade,
};
pub use simulator::{
    simulate, step, SimState, SimulationError, SimulationResult, SimulationSettings, StepContext,
    StepOutcome,
};
pub use strategy::{ParamError, StrategyKind, StrategyParams};
