//! Integration tests for the sequence driver: profit attribution, sign
//! conventions and round-trip reconstruction.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jitterlab_core::domain::Position;
use jitterlab_core::features::{compute_series, scan, FeatureParam, FeatureRecord};
use jitterlab_core::sequence::{run_sequence, Step};
use jitterlab_core::strategy::{ExitReason, Policy, Recovery, RecoveryParams, Tick, TradeStatus};

// ── Helpers ──────────────────────────────────────────────────────────

fn ts(i: usize) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_040, 0).unwrap() + Duration::minutes(i as i64)
}

/// Goes long at one step and flat at another, regardless of features.
struct Scripted {
    enter: DateTime<Utc>,
    exit: DateTime<Utc>,
    sign: f64,
}

impl Policy for Scripted {
    type Feature = FeatureRecord;

    fn name(&self) -> &str {
        "scripted"
    }

    fn profit_sign(&self) -> f64 {
        self.sign
    }

    fn should_enter(&self, _status: &TradeStatus, tick: &Tick<'_, FeatureRecord>) -> Position {
        if tick.timestamp == self.enter {
            Position::Long
        } else {
            Position::Flat
        }
    }

    fn should_exit(
        &self,
        _status: &TradeStatus,
        tick: &Tick<'_, FeatureRecord>,
    ) -> Option<ExitReason> {
        (tick.timestamp == self.exit).then_some(ExitReason::FromEnter)
    }
}

fn price_steps(values: &[f64]) -> Vec<Step<FeatureRecord>> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| Step::new(ts(i), v, scan(&[v])))
        .collect()
}

const PRICES: [f64; 10] = [100.0, 101.0, 99.0, 102.0, 104.0, 103.0, 107.0, 110.0, 108.0, 111.0];

// ── Profit attribution ───────────────────────────────────────────────

#[test]
fn single_round_trip_profit_is_delayed_one_step() {
    let policy = Scripted {
        enter: ts(3),
        exit: ts(7),
        sign: 1.0,
    };
    let table = run_sequence(&price_steps(&PRICES), &policy);

    let positions: Vec<i8> = table.rows.iter().map(|r| r.status.in_position()).collect();
    assert_eq!(positions, vec![0, 0, 0, 1, 1, 1, 1, 0, 0, 0]);
    assert_eq!(table.rows[3].position_changed, Some(1));
    assert_eq!(table.rows[7].position_changed, Some(-1));

    // deltas of steps 4..=7: 104-102, 103-104, 107-103, 110-107
    let expected: f64 = (4..=7).map(|i| PRICES[i] - PRICES[i - 1]).sum();
    assert!((table.total_profit_raw() - expected).abs() < 1e-9);
    assert!((table.total_profit_raw() - (110.0 - 102.0)).abs() < 1e-9);

    let pct: f64 = (4..=7).map(|i| PRICES[i] / PRICES[i - 1] - 1.0).sum();
    assert!((table.total_profit() - pct).abs() < 1e-12);

    // entry step earns nothing; exit step still earns
    assert_eq!(table.rows[3].profit_raw, Some(0.0));
    assert_eq!(table.rows[7].profit_raw, Some(3.0));
    assert_eq!(table.rows[8].profit_raw, Some(0.0));
}

#[test]
fn negated_families_invert_profit() {
    let plain = Scripted {
        enter: ts(3),
        exit: ts(7),
        sign: 1.0,
    };
    let negated = Scripted { sign: -1.0, ..plain };
    let steps = price_steps(&PRICES);
    let a = run_sequence(&steps, &plain);
    let b = run_sequence(&steps, &negated);
    assert!((a.total_profit_raw() + b.total_profit_raw()).abs() < 1e-12);
    assert!((a.total_profit() + b.total_profit()).abs() < 1e-12);
}

#[test]
fn zero_previous_value_contributes_no_percent_profit() {
    let policy = Scripted {
        enter: ts(0),
        exit: ts(9),
        sign: 1.0,
    };
    let table = run_sequence(&price_steps(&[0.0, 5.0, 6.0]), &policy);
    assert_eq!(table.rows[1].profit, Some(0.0));
    assert_eq!(table.rows[1].profit_raw, Some(5.0));
    assert!((table.rows[2].profit.unwrap() - 0.2).abs() < 1e-12);
}

// ── Round trips and events ───────────────────────────────────────────

#[test]
fn round_trip_reconstruction() {
    let policy = Scripted {
        enter: ts(3),
        exit: ts(7),
        sign: 1.0,
    };
    let table = run_sequence(&price_steps(&PRICES), &policy);
    let trips = table.round_trips();
    assert_eq!(trips.len(), 1);
    let trip = &trips[0];
    assert_eq!(trip.side, Position::Long);
    assert_eq!(trip.entered_at, ts(3));
    assert_eq!(trip.exited_at, Some(ts(7)));
    assert_eq!(trip.entry_value, 102.0);
    assert_eq!(trip.exit_value, Some(110.0));
    assert_eq!(trip.exit_reason, Some(ExitReason::FromEnter));
    assert_eq!(trip.periods, 4);
    assert!((trip.profit_raw - 8.0).abs() < 1e-9);

    let events: Vec<_> = table.position_changes().map(|r| r.timestamp).collect();
    assert_eq!(events, vec![ts(3), ts(7)]);
}

#[test]
fn open_trip_at_end_is_reported_open() {
    let policy = Scripted {
        enter: ts(8),
        exit: ts(100),
        sign: 1.0,
    };
    let trips = run_sequence(&price_steps(&PRICES), &policy).round_trips();
    assert_eq!(trips.len(), 1);
    assert!(!trips[0].is_closed());
    assert_eq!(trips[0].periods, 1);
}

#[test]
fn absent_feature_holds_position_but_still_earns() {
    let policy = Scripted {
        enter: ts(1),
        exit: ts(3),
        sign: 1.0,
    };
    let mut steps = price_steps(&[10.0, 10.0, 11.0, 12.0, 13.0]);
    // the exit step has no feature, so the exit is deferred
    steps[3].feature = None;
    let table = run_sequence(&steps, &policy);
    assert!(!table.rows[3].applied);
    assert_eq!(table.rows[3].status.position, Position::Long);
    assert_eq!(table.rows[4].status.position, Position::Long);
    assert!((table.total_profit_raw() - 3.0).abs() < 1e-12);
}

// ── Real family over a real series ───────────────────────────────────

#[test]
fn recovery_on_spike_and_fade() {
    // quiet, spike +30%, fade back
    let mut values = vec![100.0; 40];
    values.extend([110.0, 120.0, 130.0, 128.0, 124.0, 122.0, 121.0, 120.0, 118.0, 117.0]);
    values.extend(vec![117.0; 10]);
    let policy = Recovery::new(RecoveryParams::default_params());
    let param = FeatureParam::new(30);
    let steps: Vec<Step<FeatureRecord>> = compute_series(&values, &param)
        .into_iter()
        .enumerate()
        .map(|(i, f)| Step::new(ts(i), values[i], f))
        .collect();
    let table = run_sequence(&steps, &policy);

    let first_entry = table
        .position_changes()
        .next()
        .expect("recovery should enter on the fade");
    assert_eq!(first_entry.status.position, Position::Short);
    // the jump realizes at index 42; distance must exceed 2 before entry
    assert!(first_entry.timestamp >= ts(45));
    assert_eq!(table.profit_sign, -1.0);
}
