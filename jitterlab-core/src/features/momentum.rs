//! EMA momentum feature and its cross-sectional rank.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{check_finite, pct_change, FeatureError, FeatureView};
use crate::domain::Symbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MomentumParam {
    pub window: usize,
    pub ema_window: usize,
}

impl MomentumParam {
    pub fn new(window: usize, ema_window: usize) -> Self {
        assert!(window > 0, "window must be > 0");
        assert!(ema_window > 0, "ema_window must be > 0");
        Self { window, ema_window }
    }

    pub fn default_params() -> Self {
        Self::new(180, 60)
    }

    pub fn label(&self) -> String {
        format!("momentum-w{}-ema{}", self.window, self.ema_window)
    }
}

impl Default for MomentumParam {
    fn default() -> Self {
        Self::default_params()
    }
}

/// Trend strength of one symbol at one timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentumRecord {
    pub value: f64,
    /// EMA at the window end.
    pub ewm: f64,
    pub ch: f64,
    /// Change of the EMA across the window.
    pub ch_ewms: f64,
    /// Average rank of `ch_ewms` among all symbols, ascending (1 = weakest).
    pub rank: Option<f64>,
    /// Average rank of `ch_ewms`, descending (1 = strongest).
    pub rank_descending: Option<f64>,
}

impl FeatureView for MomentumRecord {
    fn value(&self) -> f64 {
        self.value
    }

    fn validate(&self) -> Result<(), FeatureError> {
        check_finite("value", self.value)?;
        check_finite("ewm", self.ewm)?;
        check_finite("ch", self.ch)?;
        check_finite("ch_ewms", self.ch_ewms)?;
        check_finite("rank", self.rank.ok_or(FeatureError::Missing("rank"))?)?;
        check_finite(
            "rank_descending",
            self.rank_descending
                .ok_or(FeatureError::Missing("rank_descending"))?,
        )
    }
}

/// Momentum record of a window (unranked), or `None` while it is shorter than `param.window`.
pub fn compute_momentum(window: &[f64], param: &MomentumParam) -> Option<MomentumRecord> {
    if window.len() < param.window {
        return None;
    }
    let (&first, &last) = (window.first()?, window.last()?);
    let alpha = 2.0 / (param.ema_window as f64 + 1.0);
    let ewm = window
        .iter()
        .skip(1)
        .fold(first, |ema, &v| alpha * v + (1.0 - alpha) * ema);

    Some(MomentumRecord {
        value: last,
        ewm,
        ch: pct_change(first, last),
        ch_ewms: pct_change(first, ewm),
        rank: None,
        rank_descending: None,
    })
}

pub fn momentum_series(values: &[f64], param: &MomentumParam) -> Vec<Option<MomentumRecord>> {
    let w = param.window;
    (0..values.len())
        .map(|i| {
            if i + 1 < w {
                None
            } else {
                compute_momentum(&values[i + 1 - w..=i], param)
            }
        })
        .collect()
}

/// Average ranks (ascending, descending) of the present values; ties share the mean rank.
pub fn rank_cross_section(values: &[Option<f64>]) -> Vec<Option<(f64, f64)>> {
    let mut present: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.filter(|v| !v.is_nan()).map(|v| (i, v)))
        .collect();
    present.sort_by(|a, b| a.1.total_cmp(&b.1));

    let n = present.len();
    let mut out = vec![None; values.len()];
    let mut start = 0;
    while start < n {
        let mut end = start;
        while end + 1 < n && present[end + 1].1 == present[start].1 {
            end += 1;
        }
        // 1-based ranks start+1 ..= end+1
        let avg = (start + end) as f64 / 2.0 + 1.0;
        for &(idx, _) in &present[start..=end] {
            out[idx] = Some((avg, n as f64 + 1.0 - avg));
        }
        start = end + 1;
    }
    out
}

/// Fill `rank`/`rank_descending` of timestamp-aligned symbol series in place.
pub fn apply_ranks(per_symbol: &mut [Vec<Option<MomentumRecord>>]) {
    let len = per_symbol.iter().map(Vec::len).max().unwrap_or(0);
    for t in 0..len {
        let column: Vec<Option<f64>> = per_symbol
            .iter()
            .map(|s| s.get(t).copied().flatten().map(|r| r.ch_ewms))
            .collect();
        for (series, ranks) in per_symbol.iter_mut().zip(rank_cross_section(&column)) {
            if let (Some(Some(rec)), Some((asc, desc))) = (series.get_mut(t), ranks) {
                rec.rank = Some(asc);
                rec.rank_descending = Some(desc);
            }
        }
    }
}

/// Live rank board: latest `ch_ewms` per symbol, ranked on demand.
#[derive(Debug, Default)]
pub struct RankBoard {
    latest: Mutex<HashMap<Symbol, f64>>,
}

impl RankBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the symbol's latest record and fill its ranks against every
    /// symbol reported so far.
    pub fn rank(&self, symbol: &str, record: &mut MomentumRecord) {
        let mut latest = self.latest.lock();
        latest.insert(symbol.to_string(), record.ch_ewms);
        let names: Vec<&Symbol> = latest.keys().collect();
        let column: Vec<Option<f64>> = names.iter().map(|k| latest.get(*k).copied()).collect();
        let ranks = rank_cross_section(&column);
        if let Some(pos) = names.iter().position(|k| k.as_str() == symbol) {
            if let Some((asc, desc)) = ranks[pos] {
                record.rank = Some(asc);
                record.rank_descending = Some(desc);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_starts_at_first_value() {
        let param = MomentumParam::new(3, 1);
        // alpha = 1 -> EMA tracks the last value
        let rec = compute_momentum(&[100.0, 110.0, 120.0], &param).unwrap();
        assert!((rec.ewm - 120.0).abs() < 1e-12);
        assert!((rec.ch_ewms - 0.2).abs() < 1e-12);

        let param = MomentumParam::new(3, 3);
        // alpha = 0.5: 100 -> 105 -> 112.5
        let rec = compute_momentum(&[100.0, 110.0, 120.0], &param).unwrap();
        assert!((rec.ewm - 112.5).abs() < 1e-12);
        assert!((rec.ch_ewms - 0.125).abs() < 1e-12);
        assert!((rec.ch - 0.2).abs() < 1e-12);
        assert!(rec.validate().is_err());
    }

    #[test]
    fn short_window_is_absent() {
        assert!(compute_momentum(&[1.0], &MomentumParam::new(2, 2)).is_none());
        let series = momentum_series(&[1.0, 2.0, 3.0], &MomentumParam::new(2, 2));
        assert!(series[0].is_none());
        assert!(series[1].is_some());
    }

    #[test]
    fn ranks_average_ties() {
        let ranks = rank_cross_section(&[Some(0.3), None, Some(0.1), Some(0.3)]);
        assert_eq!(ranks[0], Some((2.5, 1.5)));
        assert_eq!(ranks[1], None);
        assert_eq!(ranks[2], Some((1.0, 3.0)));
        assert_eq!(ranks[3], Some((2.5, 1.5)));
    }

    #[test]
    fn apply_ranks_per_timestamp() {
        let param = MomentumParam::new(2, 2);
        let mut series = vec![
            momentum_series(&[100.0, 110.0, 120.0], &param),
            momentum_series(&[100.0, 90.0, 80.0], &param),
        ];
        apply_ranks(&mut series);
        let up = series[0][2].unwrap();
        let down = series[1][2].unwrap();
        assert_eq!(up.rank_descending, Some(1.0));
        assert_eq!(down.rank, Some(1.0));
        assert!(up.validate().is_ok());
        assert!(series[0][0].is_none());
    }

    #[test]
    fn rank_board_ranks_latest_values() {
        let board = RankBoard::new();
        let param = MomentumParam::new(2, 2);
        let mut a = compute_momentum(&[100.0, 120.0], &param).unwrap();
        let mut b = compute_momentum(&[100.0, 90.0], &param).unwrap();
        board.rank("A", &mut a);
        assert_eq!(a.rank, Some(1.0));
        board.rank("B", &mut b);
        assert_eq!(b.rank, Some(1.0));
        assert_eq!(b.rank_descending, Some(2.0));
    }
}
