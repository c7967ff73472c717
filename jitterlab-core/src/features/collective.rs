//! Collective (cross-symbol) jitter aggregates.
//!
//! The batch path aggregates every symbol's record per timestamp, forward
//! fills timestamps without any record, and adds a rolling min/max of the
//! aggregated `ch` over the collective window. This stage is the one barrier
//! between otherwise independent per-symbol stages.
//!
//! The live path keeps the latest record per symbol in a [`CollectiveTracker`]
//! and aggregates whatever is there when a symbol reports, which tolerates
//! symbols that have not yet reported the current period.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::jitter::FeatureRecord;
use super::{check_finite, EntrySnapshot, FeatureError, FeatureView};
use crate::domain::Symbol;

/// Default number of periods for the rolling min/max of the collective `ch`.
pub const DEFAULT_COLLECTIVE_WINDOW: usize = 30;

/// How per-symbol values are combined at one timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    #[default]
    Median,
    Mean,
}

impl Aggregation {
    /// Combine a non-empty set of values. Reorders `values`.
    fn apply(self, values: &mut [f64]) -> f64 {
        match self {
            Aggregation::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Aggregation::Median => {
                values.sort_by(|a, b| a.total_cmp(b));
                let mid = values.len() / 2;
                if values.len() % 2 == 0 {
                    (values[mid - 1] + values[mid]) / 2.0
                } else {
                    values[mid]
                }
            }
        }
    }
}

/// Cross-symbol aggregate at one timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollectiveSnapshot {
    pub ch: f64,
    pub ch_max: f64,
    pub ch_min: f64,
    pub ch_since_max: f64,
    pub ch_since_min: f64,
    /// Sample standard deviation of `ch`; absent with fewer than two symbols.
    pub ch_std: Option<f64>,
    pub contributors: usize,
    /// Rolling min/max of `ch` once the collective window is full.
    pub ch_window_min: Option<f64>,
    pub ch_window_max: Option<f64>,
}

/// Aggregate the records reported at one timestamp.
pub fn aggregate<'a, I>(records: I, how: Aggregation) -> Option<CollectiveSnapshot>
where
    I: IntoIterator<Item = &'a FeatureRecord>,
{
    let records: Vec<&FeatureRecord> = records.into_iter().collect();
    if records.is_empty() {
        return None;
    }
    let column = |f: fn(&FeatureRecord) -> f64| -> f64 {
        let mut v: Vec<f64> = records.iter().map(|&r| f(r)).collect();
        how.apply(&mut v)
    };

    let chs: Vec<f64> = records.iter().map(|r| r.ch).collect();
    let ch_std = sample_std(&chs);

    Some(CollectiveSnapshot {
        ch: column(|r| r.ch),
        ch_max: column(|r| r.ch_max),
        ch_min: column(|r| r.ch_min),
        ch_since_max: column(|r| r.ch_since_max),
        ch_since_min: column(|r| r.ch_since_min),
        ch_std,
        contributors: records.len(),
        ch_window_min: None,
        ch_window_max: None,
    })
}

fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}

/// Per-timestamp collective snapshots over timestamp-aligned symbol series.
///
/// Every inner vector must be indexed by the same timestamp grid. Timestamps
/// where no symbol has a record carry the previous snapshot forward.
pub fn collective_series(
    per_symbol: &[Vec<Option<FeatureRecord>>],
    collective_window: usize,
    how: Aggregation,
) -> Vec<Option<CollectiveSnapshot>> {
    assert!(collective_window > 0, "collective_window must be > 0");
    let len = per_symbol.iter().map(Vec::len).max().unwrap_or(0);

    let mut out: Vec<Option<CollectiveSnapshot>> = Vec::with_capacity(len);
    for t in 0..len {
        let at_t = per_symbol.iter().filter_map(|s| s.get(t).copied().flatten());
        let records: Vec<FeatureRecord> = at_t.collect();
        let snap = aggregate(records.iter(), how).or_else(|| {
            out.last().copied().flatten().map(|prev| CollectiveSnapshot {
                ch_window_min: None,
                ch_window_max: None,
                ..prev
            })
        });
        out.push(snap);
    }

    for t in 0..len {
        if t + 1 < collective_window {
            continue;
        }
        let window = &out[t + 1 - collective_window..=t];
        let chs: Option<Vec<f64>> = window.iter().map(|s| s.map(|s| s.ch)).collect();
        if let (Some(chs), Some(snap)) = (chs, out[t].as_mut()) {
            snap.ch_window_min = chs.iter().copied().reduce(f64::min);
            snap.ch_window_max = chs.iter().copied().reduce(f64::max);
        }
    }
    out
}

/// A symbol's jitter record together with the collective aggregate at the same timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollectiveFeatureRecord {
    pub jitter: FeatureRecord,
    pub collective: CollectiveSnapshot,
}

impl FeatureView for CollectiveFeatureRecord {
    fn value(&self) -> f64 {
        self.jitter.value
    }

    fn validate(&self) -> Result<(), FeatureError> {
        self.jitter.validate()?;
        check_finite("ch_collective", self.collective.ch)?;
        let window_min = self
            .collective
            .ch_window_min
            .ok_or(FeatureError::Missing("ch_window_min_collective"))?;
        check_finite("ch_window_min_collective", window_min)
    }

    fn entry_snapshot(&self) -> EntrySnapshot {
        self.jitter.entry_snapshot()
    }
}

/// Pair each symbol record with the collective snapshot at the same index.
pub fn attach_collective(
    jitter: &[Option<FeatureRecord>],
    collective: &[Option<CollectiveSnapshot>],
) -> Vec<Option<CollectiveFeatureRecord>> {
    jitter
        .iter()
        .enumerate()
        .map(|(t, rec)| {
            let collective = collective.get(t).copied().flatten()?;
            Some(CollectiveFeatureRecord {
                jitter: (*rec)?,
                collective,
            })
        })
        .collect()
}

// ─── Live tracker ───────────────────────────────────────────────────

#[derive(Debug, Default)]
struct TrackerState {
    latest: HashMap<Symbol, FeatureRecord>,
    history: VecDeque<(DateTime<Utc>, f64)>,
}

/// Live collective aggregate over the most recent record of every symbol.
///
/// Shared by all symbol feeds; each report takes the lock only long enough
/// to store the record and recompute the aggregate.
#[derive(Debug)]
pub struct CollectiveTracker {
    window: usize,
    how: Aggregation,
    state: Mutex<TrackerState>,
}

impl CollectiveTracker {
    pub fn new(window: usize, how: Aggregation) -> Self {
        assert!(window > 0, "window must be > 0");
        Self {
            window,
            how,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Store `record` as the latest for `symbol` and return the aggregate
    /// for the period ending at `timestamp`.
    pub fn report(
        &self,
        symbol: &str,
        timestamp: DateTime<Utc>,
        record: &FeatureRecord,
    ) -> Option<CollectiveSnapshot> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.latest.insert(symbol.to_string(), *record);
        let mut snap = aggregate(state.latest.values(), self.how)?;

        match state.history.back_mut() {
            Some((ts, ch)) if *ts == timestamp => *ch = snap.ch,
            // a lagging symbol never rewrites or extends closed periods
            Some((ts, _)) if timestamp < *ts => {}
            _ => {
                state.history.push_back((timestamp, snap.ch));
                if state.history.len() > self.window {
                    state.history.pop_front();
                }
            }
        }
        if state.history.len() == self.window {
            let chs = state.history.iter().map(|(_, ch)| *ch);
            snap.ch_window_min = chs.clone().reduce(f64::min);
            snap.ch_window_max = chs.reduce(f64::max);
        }
        Some(snap)
    }

    /// Number of symbols that have reported at least once.
    pub fn symbols(&self) -> usize {
        self.state.lock().latest.len()
    }
}
