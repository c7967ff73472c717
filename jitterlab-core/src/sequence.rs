//! Sequence driver: feeds a symbol's feature stream through the state
//! machine and derives position and profit columns.
//!
//! Profit on a step is attributed to the position held entering the step
//! (one-step execution delay):
//!
//! - `profit_raw[t] = sign * (value[t] - value[t-1]) * position[t-1]`
//! - `profit[t]     = sign * pct_change(value[t-1], value[t]) * position[t-1]`
//!
//! where `sign` is the policy's [`profit_sign`](Policy::profit_sign).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::Position;
use crate::features::{pct_change, FeatureView};
use crate::strategy::{ExitReason, Policy, Tick, TradeStatus, Transition};

/// One input step: the price of the period and its feature record, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Step<F> {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub feature: Option<F>,
}

impl<F> Step<F> {
    pub fn new(timestamp: DateTime<Utc>, value: f64, feature: Option<F>) -> Self {
        Self {
            timestamp,
            value,
            feature,
        }
    }
}

/// One output row, parallel to the input steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceRow {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub status: TradeStatus,
    /// `false` when the step carried no usable feature and state was held over.
    pub applied: bool,
    /// Absent on the first row.
    pub position_changed: Option<i8>,
    pub profit_raw: Option<f64>,
    pub profit: Option<f64>,
}

impl SequenceRow {
    pub fn position(&self) -> Position {
        self.status.position
    }
}

/// A completed or still-open position, reconstructed from the rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundTrip {
    pub side: Position,
    pub entered_at: DateTime<Utc>,
    pub entry_value: f64,
    pub exited_at: Option<DateTime<Utc>>,
    pub exit_value: Option<f64>,
    pub exit_reason: Option<ExitReason>,
    pub periods: usize,
    pub profit: f64,
    pub profit_raw: f64,
}

impl RoundTrip {
    pub fn is_closed(&self) -> bool {
        self.exited_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceTable {
    pub policy: String,
    pub profit_sign: f64,
    pub rows: Vec<SequenceRow>,
}

impl SequenceTable {
    pub fn total_profit(&self) -> f64 {
        self.rows.iter().filter_map(|r| r.profit).sum()
    }

    pub fn total_profit_raw(&self) -> f64 {
        self.rows.iter().filter_map(|r| r.profit_raw).sum()
    }

    /// Rows where the position changed: the events an execution collaborator acts on.
    pub fn position_changes(&self) -> impl Iterator<Item = &SequenceRow> {
        self.rows
            .iter()
            .filter(|r| r.position_changed.is_some_and(|d| d != 0))
    }

    pub fn round_trips(&self) -> Vec<RoundTrip> {
        let mut trips = Vec::new();
        let mut open: Option<RoundTrip> = None;

        for row in &self.rows {
            if let Some(trip) = open.as_mut() {
                trip.profit += row.profit.unwrap_or(0.0);
                trip.profit_raw += row.profit_raw.unwrap_or(0.0);
                trip.periods += 1;
            }
            let position = row.position();
            let open_side = open.as_ref().map(|t| t.side);
            if open_side.is_some() && open_side != Some(position) {
                if let Some(mut trip) = open.take() {
                    trip.exited_at = Some(row.timestamp);
                    trip.exit_value = Some(row.value);
                    trip.exit_reason = row.status.last_exit;
                    trips.push(trip);
                }
            }
            if open.is_none() && !position.is_flat() {
                open = Some(RoundTrip {
                    side: position,
                    entered_at: row.timestamp,
                    entry_value: row.value,
                    exited_at: None,
                    exit_value: None,
                    exit_reason: None,
                    periods: 0,
                    profit: 0.0,
                    profit_raw: 0.0,
                });
            }
        }
        trips.extend(open);
        trips
    }
}

/// Drive `policy` over `steps` with a fresh [`TradeStatus`].
///
/// Steps with an absent feature hold the previous state. Steps with a
/// malformed feature also hold state and log a warning.
pub fn run_sequence<P: Policy>(steps: &[Step<P::Feature>], policy: &P) -> SequenceTable {
    let mut status = TradeStatus::new();
    let sign = policy.profit_sign();
    let mut rows: Vec<SequenceRow> = Vec::with_capacity(steps.len());

    for step in steps {
        let applied = match &step.feature {
            Some(feature) => match feature.validate() {
                Ok(()) => {
                    let transition = status.update(Tick::new(step.timestamp, feature), policy);
                    if let Transition::Exited { from, reason } = transition {
                        debug!(timestamp = %step.timestamp, ?from, ?reason, "position closed");
                    }
                    true
                }
                Err(err) => {
                    warn!(
                        policy = policy.name(),
                        timestamp = %step.timestamp,
                        error = %err,
                        "rejected malformed feature record, holding state"
                    );
                    false
                }
            },
            None => false,
        };

        let (position_changed, profit_raw, profit) = match rows.last() {
            Some(prev) => {
                let held = prev.status.position.sign();
                (
                    Some(status.position.as_i8() - prev.status.position.as_i8()),
                    Some(sign * (step.value - prev.value) * held),
                    Some(sign * pct_change(prev.value, step.value) * held),
                )
            }
            None => (None, None, None),
        };

        rows.push(SequenceRow {
            timestamp: step.timestamp,
            value: step.value,
            status: status.clone(),
            applied,
            position_changed,
            profit_raw,
            profit,
        });
    }

    SequenceTable {
        policy: policy.name().to_string(),
        profit_sign: sign,
        rows,
    }
}
