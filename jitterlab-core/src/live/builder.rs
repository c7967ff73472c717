//! Turn a closed window into the feature record a policy consumes.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::features::{
    compute_feature, compute_momentum, CollectiveFeatureRecord, CollectiveTracker, FeatureParam,
    FeatureRecord, FeatureView, MomentumParam, MomentumRecord, RankBoard,
};

pub trait FeatureBuilder: Send + Sync {
    type Feature: FeatureView;

    /// Number of closed periods the builder needs.
    fn window(&self) -> usize;

    fn build(
        &self,
        symbol: &str,
        timestamp: DateTime<Utc>,
        window: &[f64],
    ) -> Option<Self::Feature>;
}

/// Per-symbol jitter records.
#[derive(Debug, Clone)]
pub struct JitterFeatures {
    pub param: FeatureParam,
}

impl FeatureBuilder for JitterFeatures {
    type Feature = FeatureRecord;

    fn window(&self) -> usize {
        self.param.window
    }

    fn build(&self, _symbol: &str, _timestamp: DateTime<Utc>, window: &[f64]) -> Option<FeatureRecord> {
        compute_feature(window, &self.param)
    }
}

/// Jitter records joined with the live collective aggregate.
#[derive(Debug, Clone)]
pub struct CollectiveFeatures {
    pub param: FeatureParam,
    pub tracker: Arc<CollectiveTracker>,
}

impl FeatureBuilder for CollectiveFeatures {
    type Feature = CollectiveFeatureRecord;

    fn window(&self) -> usize {
        self.param.window
    }

    fn build(
        &self,
        symbol: &str,
        timestamp: DateTime<Utc>,
        window: &[f64],
    ) -> Option<CollectiveFeatureRecord> {
        let jitter = compute_feature(window, &self.param)?;
        let collective = self.tracker.report(symbol, timestamp, &jitter)?;
        Some(CollectiveFeatureRecord { jitter, collective })
    }
}

/// Momentum records ranked against the latest value of every other symbol.
#[derive(Debug, Clone)]
pub struct MomentumFeatures {
    pub param: MomentumParam,
    pub board: Arc<RankBoard>,
}

impl FeatureBuilder for MomentumFeatures {
    type Feature = MomentumRecord;

    fn window(&self) -> usize {
        self.param.window
    }

    fn build(&self, symbol: &str, _timestamp: DateTime<Utc>, window: &[f64]) -> Option<MomentumRecord> {
        let mut record = compute_momentum(window, &self.param)?;
        self.board.rank(symbol, &mut record);
        Some(record)
    }
}
