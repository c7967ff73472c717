//! Following: act on a big move at the step it happens.

use serde::{Deserialize, Serialize};

use super::{ExitReason, Policy, Tick, TradeStatus};
use crate::domain::Position;
use crate::features::{FeatureParam, FeatureRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowingParams {
    pub feature: FeatureParam,
    pub jump: f64,
    /// Threshold on every exit test (sign ignored).
    pub exit_drop: f64,
    /// Exclusive upper bound on the distance of the triggering move.
    pub max_distance: usize,
}

impl FollowingParams {
    pub fn default_params() -> Self {
        Self {
            feature: FeatureParam::default_params(),
            jump: 0.10,
            exit_drop: -0.03,
            max_distance: 1,
        }
    }
}

impl Default for FollowingParams {
    fn default() -> Self {
        Self::default_params()
    }
}

#[derive(Debug, Clone)]
pub struct Following {
    pub params: FollowingParams,
}

impl Following {
    pub fn new(params: FollowingParams) -> Self {
        assert!(params.max_distance > 0, "max_distance must be > 0");
        Self { params }
    }
}

impl Policy for Following {
    type Feature = FeatureRecord;

    fn name(&self) -> &str {
        "following"
    }

    fn profit_sign(&self) -> f64 {
        -1.0
    }

    fn should_enter(&self, _status: &TradeStatus, tick: &Tick<'_, FeatureRecord>) -> Position {
        let p = &self.params;
        let f = tick.feature;
        // Both sides gate on the distance of the up-move.
        let recent = f.distance_max_ch < p.max_distance;
        if f.ch_max > p.jump && recent {
            Position::Long
        } else if f.ch_min < -p.jump && recent {
            Position::Short
        } else {
            Position::Flat
        }
    }

    fn should_exit(
        &self,
        status: &TradeStatus,
        _tick: &Tick<'_, FeatureRecord>,
    ) -> Option<ExitReason> {
        let x = self.params.exit_drop.abs();
        let from_enter = status.ch_from_enter > x || status.ch_from_enter < -x;
        let from_extreme = match status.position {
            Position::Long => status.ch_from_lowest_since_enter > x,
            Position::Short => status.ch_from_highest_since_enter < -x,
            Position::Flat => return None,
        };
        if from_extreme {
            Some(ExitReason::FromExtreme)
        } else if from_enter {
            Some(ExitReason::FromEnter)
        } else {
            None
        }
    }
}
