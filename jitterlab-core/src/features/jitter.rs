//! Extremum-change ("jitter") scan.
//!
//! A single forward pass over a window tracks the running minimum and maximum
//! and records the largest move from a running extreme to a later value, in
//! both directions. Ties resolve to the latest point (`<=` / `>=`), so the
//! reported distances lean toward recent moves.

use serde::{Deserialize, Serialize};

use super::{check_finite, pct_change, EntrySnapshot, FeatureError, FeatureView};

/// Default rolling window (short-term strategies).
pub const DEFAULT_WINDOW: usize = 30;
/// Default rolling window for the long-term rule set.
pub const DEFAULT_LONG_TERM_WINDOW: usize = 240;

/// Rolling window configuration. The minimum size equals the window length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureParam {
    pub window: usize,
}

impl FeatureParam {
    pub fn new(window: usize) -> Self {
        assert!(window > 0, "window must be > 0");
        Self { window }
    }

    pub fn default_params() -> Self {
        Self::new(DEFAULT_WINDOW)
    }

    pub fn long_term() -> Self {
        Self::new(DEFAULT_LONG_TERM_WINDOW)
    }

    pub fn min_size(&self) -> usize {
        self.window
    }

    /// Storage label of feature tables computed with this parameter.
    pub fn label(&self) -> String {
        format!("jitter-w{}", self.window)
    }
}

impl Default for FeatureParam {
    fn default() -> Self {
        Self::default_params()
    }
}

/// Output of the scan for the final observation of a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Last value of the window.
    pub value: f64,
    /// Change from the first to the last value.
    pub ch: f64,
    pub ch_max: f64,
    pub ch_min: f64,
    /// Observations between the point realizing `ch_max` and the window end.
    pub distance_max_ch: usize,
    pub distance_min_ch: usize,
    /// Change from the point realizing `ch_max` to the last value.
    pub ch_since_max: f64,
    pub ch_since_min: f64,
    pub v_ch_max_is_from: f64,
    pub v_ch_max_is_to: f64,
    pub v_ch_min_is_from: f64,
    pub v_ch_min_is_to: f64,
    pub avg_v_before_max_ch: f64,
    pub avg_v_before_min_ch: f64,
}

impl FeatureView for FeatureRecord {
    fn value(&self) -> f64 {
        self.value
    }

    fn validate(&self) -> Result<(), FeatureError> {
        check_finite("value", self.value)?;
        check_finite("ch", self.ch)?;
        check_finite("ch_max", self.ch_max)?;
        check_finite("ch_min", self.ch_min)?;
        check_finite("ch_since_max", self.ch_since_max)?;
        check_finite("ch_since_min", self.ch_since_min)?;
        check_finite("v_ch_max_is_from", self.v_ch_max_is_from)?;
        check_finite("v_ch_max_is_to", self.v_ch_max_is_to)?;
        check_finite("v_ch_min_is_from", self.v_ch_min_is_from)?;
        check_finite("v_ch_min_is_to", self.v_ch_min_is_to)?;
        check_finite("avg_v_before_max_ch", self.avg_v_before_max_ch)?;
        check_finite("avg_v_before_min_ch", self.avg_v_before_min_ch)
    }

    fn entry_snapshot(&self) -> EntrySnapshot {
        EntrySnapshot {
            v_ch_max_is_from: self.v_ch_max_is_from,
            v_ch_max_is_to: self.v_ch_max_is_to,
            v_ch_min_is_from: self.v_ch_min_is_from,
            v_ch_min_is_to: self.v_ch_min_is_to,
        }
    }
}

/// Scan a whole window. Returns `None` only for an empty slice.
pub fn scan(values: &[f64]) -> Option<FeatureRecord> {
    let (&first, &last) = (values.first()?, values.last()?);
    let len = values.len();

    let mut rec = FeatureRecord {
        value: last,
        ch: pct_change(first, last),
        ch_max: 0.0,
        ch_min: 0.0,
        distance_max_ch: 1,
        distance_min_ch: 1,
        ch_since_max: 0.0,
        ch_since_min: 0.0,
        v_ch_max_is_from: first,
        v_ch_max_is_to: first,
        v_ch_min_is_from: first,
        v_ch_min_is_to: first,
        avg_v_before_max_ch: 0.0,
        avg_v_before_min_ch: 0.0,
    };

    let mut min_v = first;
    let mut max_v = first;
    let mut sum = 0.0;

    for (i, &v) in values.iter().enumerate() {
        min_v = min_v.min(v);
        max_v = max_v.max(v);
        sum += v;
        let avg = sum / (i + 1) as f64;

        let ch_jump = pct_change(min_v, v);
        let ch_drop = pct_change(max_v, v);
        let ch_since = pct_change(v, last);
        let distance = len - 1 - i;

        if rec.ch_max <= ch_jump {
            rec.ch_max = ch_jump;
            rec.distance_max_ch = distance;
            rec.ch_since_max = ch_since;
            rec.v_ch_max_is_from = min_v;
            rec.v_ch_max_is_to = v;
            rec.avg_v_before_max_ch = avg;
        }
        if rec.ch_min >= ch_drop {
            rec.ch_min = ch_drop;
            rec.distance_min_ch = distance;
            rec.ch_since_min = ch_since;
            rec.v_ch_min_is_from = max_v;
            rec.v_ch_min_is_to = v;
            rec.avg_v_before_min_ch = avg;
        }
    }

    Some(rec)
}

/// Feature record of a window, or `None` while the window is shorter than
/// the parameter's minimum size.
pub fn compute_feature(window: &[f64], param: &FeatureParam) -> Option<FeatureRecord> {
    if window.len() < param.min_size() {
        return None;
    }
    scan(window)
}

/// Rolling records over a full price series, one per observation.
///
/// Entries before the window fills are `None`.
pub fn compute_series(values: &[f64], param: &FeatureParam) -> Vec<Option<FeatureRecord>> {
    let w = param.window;
    (0..values.len())
        .map(|i| {
            if i + 1 < w {
                None
            } else {
                compute_feature(&values[i + 1 - w..=i], param)
            }
        })
        .collect()
}
