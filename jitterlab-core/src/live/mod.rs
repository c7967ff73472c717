//! Live path: per-symbol bounded windows fed by an incremental price stream,
//! routed to per-symbol state machines, with position changes forwarded to an
//! execution collaborator.

pub mod builder;
pub mod candle;
pub mod trader;

pub use builder::{CollectiveFeatures, FeatureBuilder, JitterFeatures, MomentumFeatures};
pub use candle::{CandleError, CandleWindow, ClosedCandle};
pub use trader::{
    ExecutionError, ExecutionRequest, FailedExecution, LiveError, LiveTrader, PriceUpdate,
    RecordingExecutor, TradeExecutor,
};
