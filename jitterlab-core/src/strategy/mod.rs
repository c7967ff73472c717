//! Per-symbol position state machine and the strategy families that drive it.
//!
//! One generic machine ([`TradeStatus::update`]) is shared by every family.
//! A family only supplies a [`Policy`]: its entry and exit predicates plus a
//! few optional hooks. Numeric behavior per family lives entirely in the
//! policy implementations.

pub mod collective_recovery;
pub mod following;
pub mod momentum;
pub mod recovery;
pub mod simple_reversal;
pub mod status;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Position;
use crate::features::FeatureView;

pub use collective_recovery::{CollectiveRecovery, CollectiveRecoveryParams, CollectiveSide};
pub use following::{Following, FollowingParams};
pub use momentum::{Momentum, MomentumParams};
pub use recovery::{Recovery, RecoveryParams};
pub use simple_reversal::{SimpleReversal, SimpleReversalParams};
pub use status::{ReversalLatch, TradeStatus};

/// One time step delivered to the state machine.
#[derive(Debug, Clone, Copy)]
pub struct Tick<'a, F> {
    pub timestamp: DateTime<Utc>,
    pub feature: &'a F,
}

impl<'a, F: FeatureView> Tick<'a, F> {
    pub fn new(timestamp: DateTime<Utc>, feature: &'a F) -> Self {
        Self { timestamp, feature }
    }

    pub fn value(&self) -> f64 {
        self.feature.value()
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Move from the best or worst value since entry crossed the exit threshold.
    FromExtreme,
    /// Move from the entry value crossed the exit threshold.
    FromEnter,
    /// Price retraced the configured fraction of the move that triggered entry.
    Retracement,
    /// Wall-clock holding cap reached.
    TimeBox,
    /// The triggering move faded below the hold threshold.
    Faded,
    /// Rank condition no longer holds at a rebalance instant.
    RankLost,
}

/// Outcome of one [`TradeStatus::update`] call. At most one transition per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Held,
    Entered(Position),
    Exited { from: Position, reason: ExitReason },
}

impl Transition {
    /// Change of the position encoding caused by this transition.
    pub fn position_delta(&self) -> i8 {
        match self {
            Transition::Held => 0,
            Transition::Entered(p) => p.as_i8(),
            Transition::Exited { from, .. } => -from.as_i8(),
        }
    }

    pub fn is_change(&self) -> bool {
        self.position_delta() != 0
    }
}

/// Entry/exit rules of one strategy family.
///
/// `update` calls, in order: [`observe`](Policy::observe) on every step; for
/// an open position the trailing statistics are refreshed and, at decision
/// steps, [`should_exit`](Policy::should_exit) is evaluated; for a flat status
/// [`should_enter`](Policy::should_enter) is evaluated and
/// [`hold_flat`](Policy::hold_flat) runs when it declines.
pub trait Policy: Send + Sync {
    type Feature: FeatureView;

    fn name(&self) -> &str;

    /// Multiplier applied to position-weighted returns and to live sizing.
    ///
    /// `-1.0` for families whose long position economically bets against the
    /// reference asset.
    fn profit_sign(&self) -> f64 {
        1.0
    }

    /// Whether entry/exit rules are evaluated at this timestamp.
    fn is_decision_step(&self, _timestamp: DateTime<Utc>) -> bool {
        true
    }

    /// Per-step bookkeeping that runs before any transition rule.
    fn observe(&self, _status: &mut TradeStatus, _tick: &Tick<'_, Self::Feature>) {}

    fn should_enter(&self, status: &TradeStatus, tick: &Tick<'_, Self::Feature>) -> Position;

    fn should_exit(
        &self,
        status: &TradeStatus,
        tick: &Tick<'_, Self::Feature>,
    ) -> Option<ExitReason>;

    /// Runs after a position was closed and the position fields cleared.
    fn on_exit(&self, _status: &mut TradeStatus, _reason: ExitReason) {}

    /// Runs on a flat step when no entry fired.
    fn hold_flat(&self, status: &mut TradeStatus) {
        status.reset();
    }
}

/// Boxed policies are policies, so families can be chosen at runtime.
impl<P: Policy + ?Sized> Policy for Box<P> {
    type Feature = P::Feature;

    fn name(&self) -> &str {
        (**self).name()
    }
    fn profit_sign(&self) -> f64 {
        (**self).profit_sign()
    }
    fn is_decision_step(&self, timestamp: DateTime<Utc>) -> bool {
        (**self).is_decision_step(timestamp)
    }
    fn observe(&self, status: &mut TradeStatus, tick: &Tick<'_, Self::Feature>) {
        (**self).observe(status, tick)
    }
    fn should_enter(&self, status: &TradeStatus, tick: &Tick<'_, Self::Feature>) -> Position {
        (**self).should_enter(status, tick)
    }
    fn should_exit(
        &self,
        status: &TradeStatus,
        tick: &Tick<'_, Self::Feature>,
    ) -> Option<ExitReason> {
        (**self).should_exit(status, tick)
    }
    fn on_exit(&self, status: &mut TradeStatus, reason: ExitReason) {
        (**self).on_exit(status, reason)
    }
    fn hold_flat(&self, status: &mut TradeStatus) {
        (**self).hold_flat(status)
    }
}

/// Strict recency window `low < distance < high`.
#[inline]
pub(crate) fn within(distance: usize, low: usize, high: usize) -> bool {
    low < distance && distance < high
}
