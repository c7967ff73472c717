//! Collective recovery: recovery entries gated by the market-wide move.
//!
//! The long side trades a symbol's rebound after a drop while the collective
//! `ch` has also dropped inside a band; the short side mirrors it for jumps.
//! Both sides read the rolling minimum of the collective `ch`.

use serde::{Deserialize, Serialize};

use super::{within, ExitReason, Policy, Tick, TradeStatus};
use crate::domain::Position;
use crate::features::{CollectiveFeatureRecord, FeatureParam, DEFAULT_COLLECTIVE_WINDOW};

const MIN_HOLD_FOR_TRAILING_EXIT: u32 = 5;
const RECENCY: (usize, usize) = (2, 20);

/// Thresholds of one side of the collective recovery rules.
///
/// On the drop side every threshold is a move down from the collective and
/// symbol point of view; on the jump side the signs flip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollectiveSide {
    /// The collective window minimum must be past this value...
    pub collective_threshold: f64,
    /// ...but not past this one.
    pub collective_bound: f64,
    /// Symbol move (`ch_min` or `ch_max`) required.
    pub threshold: f64,
    /// Symbol reversal since the move required.
    pub rebound: f64,
    /// Exit threshold on moves from entry and from the best point.
    pub exit: f64,
}

impl CollectiveSide {
    pub fn drop_default() -> Self {
        Self {
            collective_threshold: -0.10,
            collective_bound: -0.40,
            threshold: -0.15,
            rebound: 0.04,
            exit: -0.02,
        }
    }

    pub fn drop_small() -> Self {
        Self {
            collective_threshold: -0.03,
            collective_bound: -0.15,
            threshold: -0.03,
            rebound: 0.005,
            exit: -0.01,
        }
    }

    pub fn jump_default() -> Self {
        Self {
            collective_threshold: 0.10,
            collective_bound: 0.40,
            threshold: 0.15,
            rebound: -0.04,
            exit: 0.02,
        }
    }

    pub fn jump_small() -> Self {
        Self {
            collective_threshold: 0.03,
            collective_bound: 0.15,
            threshold: 0.03,
            rebound: -0.005,
            exit: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectiveRecoveryParams {
    pub feature: FeatureParam,
    pub collective_window: usize,
    /// Long side; disabled when absent.
    pub drop: Option<CollectiveSide>,
    /// Short side; disabled when absent.
    pub jump: Option<CollectiveSide>,
}

impl CollectiveRecoveryParams {
    pub fn default_params() -> Self {
        Self {
            feature: FeatureParam::new(40),
            collective_window: DEFAULT_COLLECTIVE_WINDOW,
            drop: Some(CollectiveSide::drop_default()),
            jump: Some(CollectiveSide::jump_default()),
        }
    }

    pub fn small_moves() -> Self {
        Self {
            drop: Some(CollectiveSide::drop_small()),
            jump: Some(CollectiveSide::jump_small()),
            ..Self::default_params()
        }
    }
}

impl Default for CollectiveRecoveryParams {
    fn default() -> Self {
        Self::default_params()
    }
}

#[derive(Debug, Clone)]
pub struct CollectiveRecovery {
    pub params: CollectiveRecoveryParams,
}

impl CollectiveRecovery {
    pub fn new(params: CollectiveRecoveryParams) -> Self {
        assert!(params.collective_window > 0, "collective_window must be > 0");
        Self { params }
    }
}

impl Policy for CollectiveRecovery {
    type Feature = CollectiveFeatureRecord;

    fn name(&self) -> &str {
        "collective_recovery"
    }

    fn should_enter(
        &self,
        _status: &TradeStatus,
        tick: &Tick<'_, CollectiveFeatureRecord>,
    ) -> Position {
        let f = &tick.feature.jitter;
        let Some(cwm) = tick.feature.collective.ch_window_min else {
            return Position::Flat;
        };
        let (low, high) = RECENCY;

        let long = self.params.drop.is_some_and(|d| {
            cwm < d.collective_threshold
                && cwm > d.collective_bound
                && f.ch_min < d.threshold
                && f.ch_since_min > d.rebound
                && within(f.distance_min_ch, low, high)
        });
        let short = self.params.jump.is_some_and(|j| {
            cwm > j.collective_threshold
                && cwm < j.collective_bound
                && f.ch_max > j.threshold
                && f.ch_since_max < j.rebound
                && within(f.distance_max_ch, low, high)
        });

        if long {
            Position::Long
        } else if short {
            Position::Short
        } else {
            Position::Flat
        }
    }

    fn should_exit(
        &self,
        status: &TradeStatus,
        tick: &Tick<'_, CollectiveFeatureRecord>,
    ) -> Option<ExitReason> {
        let value = tick.value();
        let held = status.periods_since_enter >= MIN_HOLD_FOR_TRAILING_EXIT;
        let snap = &status.entry_snapshot;

        match status.position {
            Position::Long => {
                let exit = self.params.drop?.exit;
                let (from, to) = (snap.v_ch_min_is_from, snap.v_ch_min_is_to);
                if status.ch_from_highest_since_enter < exit && held {
                    Some(ExitReason::FromExtreme)
                } else if status.ch_from_enter < exit {
                    Some(ExitReason::FromEnter)
                } else if value > from - (from - to) / 3.0 {
                    Some(ExitReason::Retracement)
                } else {
                    None
                }
            }
            Position::Short => {
                let exit = self.params.jump?.exit;
                let (from, to) = (snap.v_ch_max_is_from, snap.v_ch_max_is_to);
                if status.ch_from_lowest_since_enter > exit && held {
                    Some(ExitReason::FromExtreme)
                } else if status.ch_from_enter > exit {
                    Some(ExitReason::FromEnter)
                } else if value < from + (to - from) / 3.0 {
                    Some(ExitReason::Retracement)
                } else {
                    None
                }
            }
            Position::Flat => None,
        }
    }
}
