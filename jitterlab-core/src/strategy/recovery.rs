//! Recovery: bet on a big move reverting once it has started to reverse.
//!
//! Positions are accounted with a negated profit sign; a `Long` position
//! here is economically a bet against the reference asset.

use serde::{Deserialize, Serialize};

use super::{within, ExitReason, Policy, Tick, TradeStatus};
use crate::domain::Position;
use crate::features::{FeatureParam, FeatureRecord};

/// Minimum hold count before a long-term exit may fire.
///
/// The hold count advances twice per step held, so the gate opens on the
/// third step after entry.
pub const LONG_TERM_MIN_HOLD: u32 = 5;

/// Hold count for a position held `periods` steps.
pub fn hold_count(periods: u32) -> u32 {
    periods.saturating_mul(2)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryParams {
    pub feature: FeatureParam,
    /// Size of the move that qualifies as a jump.
    pub jump: f64,
    /// Reversal after the jump required before entering (negative).
    pub drop_from_jump: f64,
    /// Retracement from the best point since entry that closes the position.
    pub exit: f64,
    /// Slower rule set: single-sided entry, tighter recency, minimum hold.
    pub long_term: bool,
}

impl RecoveryParams {
    pub fn default_params() -> Self {
        Self {
            feature: FeatureParam::default_params(),
            jump: 0.20,
            drop_from_jump: -0.04,
            exit: 0.02,
            long_term: false,
        }
    }

    pub fn long_term() -> Self {
        Self {
            feature: FeatureParam::long_term(),
            jump: 0.40,
            drop_from_jump: -0.10,
            exit: 0.05,
            long_term: true,
        }
    }

    /// Recency bounds `(low, high)` for the distance of the triggering move.
    pub fn recency(&self) -> (usize, usize) {
        if self.long_term {
            (2, 10)
        } else {
            (2, 60)
        }
    }
}

impl Default for RecoveryParams {
    fn default() -> Self {
        Self::default_params()
    }
}

#[derive(Debug, Clone)]
pub struct Recovery {
    pub params: RecoveryParams,
}

impl Recovery {
    pub fn new(params: RecoveryParams) -> Self {
        assert!(params.exit.is_finite(), "exit must be finite");
        Self { params }
    }
}

impl Policy for Recovery {
    type Feature = FeatureRecord;

    fn name(&self) -> &str {
        "recovery"
    }

    fn profit_sign(&self) -> f64 {
        -1.0
    }

    fn should_enter(&self, _status: &TradeStatus, tick: &Tick<'_, FeatureRecord>) -> Position {
        let p = &self.params;
        let f = tick.feature;
        let (low, high) = p.recency();

        if p.long_term {
            if f.ch_max > p.jump
                && f.ch_since_max < p.drop_from_jump
                && within(f.distance_max_ch, low, high)
            {
                return Position::Long;
            }
            return Position::Flat;
        }

        let jump = p.jump.abs();
        let drop = p.drop_from_jump.abs();
        let mut side = Position::Flat;
        if f.ch_max > jump && f.ch_since_max < -drop && within(f.distance_max_ch, low, high) {
            side = Position::Short;
        }
        if f.ch_min < -jump && f.ch_since_min > drop && within(f.distance_min_ch, low, high) {
            side = Position::Long;
        }
        side
    }

    fn should_exit(
        &self,
        status: &TradeStatus,
        _tick: &Tick<'_, FeatureRecord>,
    ) -> Option<ExitReason> {
        let p = &self.params;
        let exit = p.exit.abs();
        let held = !p.long_term || hold_count(status.periods_since_enter) >= LONG_TERM_MIN_HOLD;

        let ch_lowest = status.ch_from_lowest_since_enter;
        let fired = match status.position {
            Position::Long => status.ch_from_highest_since_enter < -exit,
            // A short-term short also closes while still within `exit` of
            // its lowest point; only a change of exactly `exit` keeps it open.
            Position::Short if !p.long_term => ch_lowest > exit || ch_lowest < p.exit,
            Position::Short => ch_lowest > exit,
            Position::Flat => false,
        };
        (fired && held).then_some(ExitReason::FromExtreme)
    }
}
