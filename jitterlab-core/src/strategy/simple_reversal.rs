//! Simple reversal: latch a large move, enter once it fades and reverses.
//!
//! Holding time is measured in wall-clock seconds truncated to within a day:
//! an elapsed span of one day and ten minutes reads as ten minutes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ExitReason, Policy, ReversalLatch, Tick, TradeStatus};
use crate::domain::Position;
use crate::features::{FeatureParam, FeatureRecord};

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleReversalParams {
    pub feature: FeatureParam,
    pub jump: f64,
    pub drop_from_jump: f64,
    /// Holding cap in seconds.
    pub max_hold_seconds: i64,
    /// A position is kept only while the triggering move stays beyond this size.
    pub hold_threshold: f64,
}

impl SimpleReversalParams {
    pub fn default_params() -> Self {
        Self {
            feature: FeatureParam::default_params(),
            jump: 0.18,
            drop_from_jump: -0.02,
            max_hold_seconds: 30 * 60,
            hold_threshold: 0.025,
        }
    }
}

impl Default for SimpleReversalParams {
    fn default() -> Self {
        Self::default_params()
    }
}

#[derive(Debug, Clone)]
pub struct SimpleReversal {
    pub params: SimpleReversalParams,
}

impl SimpleReversal {
    pub fn new(params: SimpleReversalParams) -> Self {
        assert!(params.max_hold_seconds > 0, "max_hold_seconds must be positive");
        Self { params }
    }
}

/// Seconds component of the span since entry, in `0..86400`.
pub fn truncated_seconds(since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    since
        .map(|t| (now - t).num_seconds().rem_euclid(SECONDS_PER_DAY))
        .unwrap_or(0)
}

impl Policy for SimpleReversal {
    type Feature = FeatureRecord;

    fn name(&self) -> &str {
        "simple_reversal"
    }

    fn observe(&self, status: &mut TradeStatus, tick: &Tick<'_, FeatureRecord>) {
        let f = tick.feature;
        let jump = self.params.jump.abs();
        let latch = &mut status.latch;

        if latch.max_threshold_crossed && f.ch_max > latch.highest_ch_max {
            latch.highest_ch_max = f.ch_max;
        }
        if latch.min_threshold_crossed && f.ch_min < latch.lowest_ch_min {
            latch.lowest_ch_min = f.ch_min;
        }

        if status.position.is_flat() {
            if f.ch_max > jump {
                latch.max_threshold_crossed = true;
                latch.highest_ch_max = f.ch_max;
            }
            if f.ch_min < -jump {
                latch.min_threshold_crossed = true;
                latch.lowest_ch_min = f.ch_min;
            }
        }
    }

    fn should_enter(&self, status: &TradeStatus, tick: &Tick<'_, FeatureRecord>) -> Position {
        let f = tick.feature;
        let jump = self.params.jump.abs();
        let drop = self.params.drop_from_jump.abs();

        let mut side = Position::Flat;
        if status.latch.max_threshold_crossed && f.ch_max < jump && f.ch_since_max < -drop {
            side = Position::Short;
        }
        if status.latch.min_threshold_crossed && f.ch_min > -jump && f.ch_since_min > drop {
            side = Position::Long;
        }
        side
    }

    fn should_exit(
        &self,
        status: &TradeStatus,
        tick: &Tick<'_, FeatureRecord>,
    ) -> Option<ExitReason> {
        let p = &self.params;
        let f = tick.feature;
        let jump = p.jump.abs();
        let timed_out =
            truncated_seconds(status.timestamp_at_enter, tick.timestamp) > p.max_hold_seconds;

        let (faded, took_move) = match status.position {
            Position::Short => (f.ch_max < p.hold_threshold, status.ch_from_enter < -jump),
            Position::Long => (f.ch_min > -p.hold_threshold, status.ch_from_enter > jump),
            Position::Flat => return None,
        };

        if timed_out {
            Some(ExitReason::TimeBox)
        } else if faded {
            Some(ExitReason::Faded)
        } else if took_move {
            Some(ExitReason::FromEnter)
        } else {
            None
        }
    }

    fn on_exit(&self, status: &mut TradeStatus, reason: ExitReason) {
        if matches!(reason, ExitReason::TimeBox | ExitReason::Faded) {
            status.latch = ReversalLatch::default();
        }
    }

    fn hold_flat(&self, status: &mut TradeStatus) {
        status.reset();
        // Only the min side latched: drop both latches.
        if !status.latch.max_threshold_crossed && status.latch.min_threshold_crossed {
            status.latch = ReversalLatch::default();
        }
    }
}
