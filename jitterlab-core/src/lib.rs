//! JitterLab Core: jitter features, per-symbol position state machine,
//! sequence driver and live routing.
//!
//! - Feature engines: extremum-change scan, collective aggregates, EMA momentum
//! - One generic position state machine, parameterized by strategy policies
//! - Sequence driver with one-step delayed profit attribution
//! - Live path: bounded candle windows and per-symbol locking
//! - Storage and execution ports; no file or network I/O here

pub mod config;
pub mod domain;
pub mod features;
pub mod live;
pub mod rng;
pub mod sequence;
pub mod storage;
pub mod strategy;

pub use config::{ConfigError, StrategyConfig};
pub use sequence::{run_sequence, SequenceRow, SequenceTable, Step};
pub use strategy::{Policy, TradeStatus};
