//! Mutable per-symbol trade state and the generic transition rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ExitReason, Policy, Tick, Transition};
use crate::domain::Position;
use crate::features::{pct_change, EntrySnapshot, FeatureView};

/// Latched threshold crossings used by the simple reversal family.
///
/// Latches survive flat steps; they are cleared only by the family's own
/// exit and reset rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReversalLatch {
    pub max_threshold_crossed: bool,
    pub min_threshold_crossed: bool,
    pub highest_ch_max: f64,
    pub lowest_ch_min: f64,
}

/// Per-symbol state of the position state machine.
///
/// Created flat and zeroed. Position-scoped fields are only meaningful while
/// `position` is not flat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStatus {
    pub position: Position,
    pub value_at_enter: f64,
    pub lowest_since_enter: f64,
    pub highest_since_enter: f64,
    /// Steps since entry (not wall-clock).
    pub periods_since_enter: u32,
    pub timestamp_at_enter: Option<DateTime<Utc>>,
    pub ch_from_enter: f64,
    pub ch_from_lowest_since_enter: f64,
    pub ch_from_highest_since_enter: f64,
    pub entry_snapshot: EntrySnapshot,
    pub latch: ReversalLatch,
    pub last_exit: Option<ExitReason>,
}

impl TradeStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to flat with every position-scoped field zeroed. Latches and the
    /// last exit reason are kept.
    pub fn reset(&mut self) {
        *self = Self {
            latch: self.latch,
            last_exit: self.last_exit,
            ..Self::default()
        };
    }

    pub fn in_position(&self) -> i8 {
        self.position.as_i8()
    }

    /// Advance the machine by one step.
    pub fn update<P: Policy>(&mut self, tick: Tick<'_, P::Feature>, policy: &P) -> Transition {
        policy.observe(self, &tick);

        if !self.position.is_flat() {
            self.refresh_trailing(tick.value());
        }
        if !policy.is_decision_step(tick.timestamp) {
            return Transition::Held;
        }

        if self.position.is_flat() {
            match policy.should_enter(self, &tick) {
                Position::Flat => {
                    policy.hold_flat(self);
                    Transition::Held
                }
                side => {
                    self.enter(side, &tick);
                    Transition::Entered(side)
                }
            }
        } else {
            match policy.should_exit(self, &tick) {
                Some(reason) => {
                    let from = self.position;
                    self.reset();
                    self.last_exit = Some(reason);
                    policy.on_exit(self, reason);
                    Transition::Exited { from, reason }
                }
                None => Transition::Held,
            }
        }
    }

    fn refresh_trailing(&mut self, value: f64) {
        if value < self.lowest_since_enter {
            self.lowest_since_enter = value;
        }
        if value > self.highest_since_enter {
            self.highest_since_enter = value;
        }
        self.periods_since_enter = self.periods_since_enter.saturating_add(1);
        self.ch_from_enter = pct_change(self.value_at_enter, value);
        self.ch_from_lowest_since_enter = pct_change(self.lowest_since_enter, value);
        self.ch_from_highest_since_enter = pct_change(self.highest_since_enter, value);
    }

    fn enter<F: FeatureView>(&mut self, side: Position, tick: &Tick<'_, F>) {
        let value = tick.value();
        self.position = side;
        self.value_at_enter = value;
        self.lowest_since_enter = value;
        self.highest_since_enter = value;
        self.periods_since_enter = 0;
        self.timestamp_at_enter = Some(tick.timestamp);
        self.ch_from_enter = 0.0;
        self.ch_from_lowest_since_enter = 0.0;
        self.ch_from_highest_since_enter = 0.0;
        self.entry_snapshot = tick.feature.entry_snapshot();
        self.last_exit = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureError;
    use chrono::TimeZone;

    /// Bare price feature for exercising the generic rule.
    struct Price(f64);

    impl FeatureView for Price {
        fn value(&self) -> f64 {
            self.0
        }
        fn validate(&self) -> Result<(), FeatureError> {
            Ok(())
        }
    }

    /// Enters long above `enter_at`, exits when price drops below `exit_at`.
    struct Threshold {
        enter_at: f64,
        exit_at: f64,
    }

    impl Policy for Threshold {
        type Feature = Price;

        fn name(&self) -> &str {
            "threshold"
        }

        fn should_enter(&self, _status: &TradeStatus, tick: &Tick<'_, Price>) -> Position {
            if tick.value() > self.enter_at {
                Position::Long
            } else if tick.value() < self.exit_at {
                Position::Short
            } else {
                Position::Flat
            }
        }

        fn should_exit(&self, status: &TradeStatus, tick: &Tick<'_, Price>) -> Option<ExitReason> {
            match status.position {
                Position::Long if tick.value() < self.exit_at => Some(ExitReason::FromEnter),
                Position::Short if tick.value() > self.enter_at => Some(ExitReason::FromEnter),
                _ => None,
            }
        }
    }

    fn ts(minute: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_040 + minute * 60, 0).unwrap()
    }

    fn step(status: &mut TradeStatus, policy: &Threshold, minute: i64, price: f64) -> Transition {
        status.update(Tick::new(ts(minute), &Price(price)), policy)
    }

    #[test]
    fn starts_flat_and_zeroed() {
        let status = TradeStatus::new();
        assert_eq!(status.in_position(), 0);
        assert_eq!(status.value_at_enter, 0.0);
        assert_eq!(status.timestamp_at_enter, None);
    }

    #[test]
    fn entry_snapshots_value() {
        let policy = Threshold { enter_at: 105.0, exit_at: 95.0 };
        let mut status = TradeStatus::new();
        assert_eq!(step(&mut status, &policy, 0, 100.0), Transition::Held);
        assert_eq!(
            step(&mut status, &policy, 1, 106.0),
            Transition::Entered(Position::Long)
        );
        assert_eq!(status.value_at_enter, 106.0);
        assert_eq!(status.lowest_since_enter, 106.0);
        assert_eq!(status.highest_since_enter, 106.0);
        assert_eq!(status.periods_since_enter, 0);
        assert_eq!(status.timestamp_at_enter, Some(ts(1)));
    }

    #[test]
    fn trailing_stats_refresh_while_in_position() {
        let policy = Threshold { enter_at: 105.0, exit_at: 50.0 };
        let mut status = TradeStatus::new();
        step(&mut status, &policy, 0, 110.0);
        step(&mut status, &policy, 1, 121.0);
        step(&mut status, &policy, 2, 99.0);
        assert_eq!(status.periods_since_enter, 2);
        assert_eq!(status.highest_since_enter, 121.0);
        assert_eq!(status.lowest_since_enter, 99.0);
        assert!((status.ch_from_enter - (99.0 / 110.0 - 1.0)).abs() < 1e-12);
        assert!((status.ch_from_highest_since_enter - (99.0 / 121.0 - 1.0)).abs() < 1e-12);
        assert_eq!(status.ch_from_lowest_since_enter, 0.0);
    }

    #[test]
    fn exit_and_reentry_take_two_calls() {
        let policy = Threshold { enter_at: 105.0, exit_at: 95.0 };
        let mut status = TradeStatus::new();
        step(&mut status, &policy, 0, 106.0);
        // 90 both exits the long and would enter a short; only the exit happens
        let t = step(&mut status, &policy, 1, 90.0);
        assert_eq!(
            t,
            Transition::Exited {
                from: Position::Long,
                reason: ExitReason::FromEnter
            }
        );
        assert_eq!(status.position, Position::Flat);
        assert_eq!(status.value_at_enter, 0.0);
        assert_eq!(status.last_exit, Some(ExitReason::FromEnter));
        assert_eq!(
            step(&mut status, &policy, 2, 90.0),
            Transition::Entered(Position::Short)
        );
    }

    #[test]
    fn zero_entry_value_is_guarded() {
        let policy = Threshold { enter_at: -1.0, exit_at: -2.0 };
        let mut status = TradeStatus::new();
        step(&mut status, &policy, 0, 0.0);
        assert_eq!(status.position, Position::Long);
        step(&mut status, &policy, 1, 5.0);
        assert_eq!(status.ch_from_enter, 0.0);
    }

    #[test]
    fn reset_keeps_latches() {
        let mut status = TradeStatus::new();
        status.latch.max_threshold_crossed = true;
        status.position = Position::Long;
        status.value_at_enter = 10.0;
        status.reset();
        assert_eq!(status.position, Position::Flat);
        assert_eq!(status.value_at_enter, 0.0);
        assert!(status.latch.max_threshold_crossed);
    }
}
