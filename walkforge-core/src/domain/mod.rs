//! Domain types for WalkForge

pub mod candle;
pub mod params;
pub mod position;
pub mod trade;

pub use candle::{Candle, CandleError, CandleSeries};
pub use params::{ParamValue, ParameterSet};
pub use position::{stop_loss_price, take_profit_price, OpenPosition, PositionState};
pub use trade::{EquityPoint, ExitReason, OpenTrade, Side, Trade};
