//! Feature engines.
//!
//! - [`jitter`]: the extremum-change scan over a rolling window.
//! - [`collective`]: cross-symbol aggregates of jitter records.
//! - [`momentum`]: EMA trend strength and its cross-sectional rank.
//!
//! Every record type implements [`FeatureView`], the read-only surface the
//! position state machine consumes.

pub mod collective;
pub mod jitter;
pub mod momentum;

use serde::{Deserialize, Serialize};

pub use collective::{
    aggregate, attach_collective, collective_series, Aggregation, CollectiveFeatureRecord,
    CollectiveSnapshot, CollectiveTracker, DEFAULT_COLLECTIVE_WINDOW,
};
pub use jitter::{compute_feature, compute_series, scan, FeatureParam, FeatureRecord};
pub use momentum::{
    apply_ranks, compute_momentum, momentum_series, rank_cross_section, MomentumParam,
    MomentumRecord, RankBoard,
};

/// Percent change from `from` to `to`, defined as `0` when `from == 0`.
#[inline]
pub fn pct_change(from: f64, to: f64) -> f64 {
    if from == 0.0 {
        0.0
    } else {
        (to - from) / from
    }
}

/// A feature record that failed validation and must not reach the state machine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeatureError {
    #[error("feature field `{field}` is not finite ({value})")]
    NonFinite { field: &'static str, value: f64 },
    #[error("feature field `{0}` is missing")]
    Missing(&'static str),
}

/// Reject NaN and infinities for a named field.
pub(crate) fn check_finite(field: &'static str, value: f64) -> Result<(), FeatureError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(FeatureError::NonFinite { field, value })
    }
}

/// Values of the triggering feature captured when a position is entered.
///
/// Exit rules that test how much of the entry move has been retraced read
/// these instead of the current record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub v_ch_max_is_from: f64,
    pub v_ch_max_is_to: f64,
    pub v_ch_min_is_from: f64,
    pub v_ch_min_is_to: f64,
}

/// Read-only view of a per-step feature record.
pub trait FeatureView {
    /// Price of the step the record describes.
    fn value(&self) -> f64;

    /// Check that every field the policies read is present and finite.
    fn validate(&self) -> Result<(), FeatureError>;

    /// Fields to keep for the lifetime of a position opened on this record.
    fn entry_snapshot(&self) -> EntrySnapshot {
        EntrySnapshot::default()
    }
}
