//! Cross-sectional momentum: hold the top-K symbols by EMA trend.
//!
//! Decisions happen only at rebalance instants (epoch seconds divisible by
//! the rebalance interval); between them trailing statistics still update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ExitReason, Policy, Tick, TradeStatus};
use crate::domain::Position;
use crate::features::{MomentumParam, MomentumRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumParams {
    pub feature: MomentumParam,
    pub selection_size: usize,
    pub rebalance_minutes: i64,
}

impl MomentumParams {
    pub fn default_params() -> Self {
        Self {
            feature: MomentumParam::default_params(),
            selection_size: 10,
            rebalance_minutes: 360,
        }
    }
}

impl Default for MomentumParams {
    fn default() -> Self {
        Self::default_params()
    }
}

#[derive(Debug, Clone)]
pub struct Momentum {
    pub params: MomentumParams,
}

impl Momentum {
    pub fn new(params: MomentumParams) -> Self {
        assert!(params.selection_size > 0, "selection_size must be > 0");
        assert!(params.rebalance_minutes > 0, "rebalance_minutes must be > 0");
        Self { params }
    }

    fn wanted(&self, f: &MomentumRecord) -> Position {
        let k = self.params.selection_size as f64;
        let (Some(rank), Some(rank_desc)) = (f.rank, f.rank_descending) else {
            return Position::Flat;
        };
        if rank_desc <= k && f.ch_ewms > 0.0 {
            Position::Long
        } else if rank <= k && f.ch_ewms < 0.0 {
            Position::Short
        } else {
            Position::Flat
        }
    }
}

impl Policy for Momentum {
    type Feature = MomentumRecord;

    fn name(&self) -> &str {
        "momentum"
    }

    fn is_decision_step(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp
            .timestamp()
            .rem_euclid(self.params.rebalance_minutes * 60)
            == 0
    }

    fn should_enter(&self, _status: &TradeStatus, tick: &Tick<'_, MomentumRecord>) -> Position {
        self.wanted(tick.feature)
    }

    fn should_exit(
        &self,
        status: &TradeStatus,
        tick: &Tick<'_, MomentumRecord>,
    ) -> Option<ExitReason> {
        (self.wanted(tick.feature) != status.position).then_some(ExitReason::RankLost)
    }
}
