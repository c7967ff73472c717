//! Storage port for produced tables.
//!
//! Tables are keyed by [`TableKey`] and partitioned by UTC day. A read over
//! a day range is absent unless every day of the range is present, which
//! lets callers treat a partial hit as a miss and recompute.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::domain::{PriceObservation, TableKey};
use crate::sequence::{SequenceRow, Step};

/// Rows that belong to a point in time.
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl<F> Timestamped for Step<F> {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for PriceObservation {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for SequenceRow {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Inclusive range of UTC days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DayRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        assert!(start <= end, "start must not be after end");
        Self { start, end }
    }

    /// Range covering the first and last row.
    pub fn spanning<R: Timestamped>(rows: &[R]) -> Option<Self> {
        let first = rows.first()?.timestamp().date_naive();
        let last = rows.last()?.timestamp().date_naive();
        (first <= last).then(|| Self::new(first, last))
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("rows for {key} are not ordered by timestamp")]
    Unordered { key: TableKey },
}

pub trait TableStore<R>: Send + Sync {
    /// Store rows, replacing any stored partition for the days they cover.
    fn put(&self, key: &TableKey, rows: &[R]) -> Result<(), StorageError>;

    /// Rows of every day in `range`, or `None` if any day is missing.
    fn get(&self, key: &TableKey, range: DayRange) -> Result<Option<Vec<R>>, StorageError>;
}

/// In-process day-partitioned store.
#[derive(Debug)]
pub struct MemoryTableStore<R> {
    partitions: RwLock<BTreeMap<(TableKey, NaiveDate), Vec<R>>>,
}

impl<R> Default for MemoryTableStore<R> {
    fn default() -> Self {
        Self {
            partitions: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<R> MemoryTableStore<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.read().len()
    }
}

impl<R> TableStore<R> for MemoryTableStore<R>
where
    R: Timestamped + Clone + Send + Sync,
{
    fn put(&self, key: &TableKey, rows: &[R]) -> Result<(), StorageError> {
        if rows.windows(2).any(|w| w[0].timestamp() > w[1].timestamp()) {
            return Err(StorageError::Unordered { key: key.clone() });
        }
        let mut by_day: BTreeMap<NaiveDate, Vec<R>> = BTreeMap::new();
        for row in rows {
            by_day
                .entry(row.timestamp().date_naive())
                .or_default()
                .push(row.clone());
        }
        let mut partitions = self.partitions.write();
        for (day, rows) in by_day {
            partitions.insert((key.clone(), day), rows);
        }
        Ok(())
    }

    fn get(&self, key: &TableKey, range: DayRange) -> Result<Option<Vec<R>>, StorageError> {
        let partitions = self.partitions.read();
        let mut out = Vec::new();
        for day in range.days() {
            match partitions.get(&(key.clone(), day)) {
                Some(rows) => out.extend(rows.iter().cloned()),
                None => return Ok(None),
            }
        }
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn rows(hours: &[i64]) -> Vec<Step<f64>> {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        hours
            .iter()
            .map(|&h| Step::new(base + Duration::hours(h), h as f64, Some(h as f64)))
            .collect()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn put_then_get_full_range() {
        let store = MemoryTableStore::new();
        let key = TableKey::new("jitter-w30", "A");
        let data = rows(&[1, 12, 25, 47]);
        store.put(&key, &data).unwrap();
        assert_eq!(store.partition_count(), 2);
        let got = store.get(&key, DayRange::new(day(1), day(2))).unwrap().unwrap();
        assert_eq!(got, data);
        let first_day = store.get(&key, DayRange::new(day(1), day(1))).unwrap().unwrap();
        assert_eq!(first_day.len(), 2);
    }

    #[test]
    fn missing_day_is_absent() {
        let store = MemoryTableStore::new();
        let key = TableKey::new("jitter-w30", "A");
        store.put(&key, &rows(&[1, 2])).unwrap();
        assert!(store.get(&key, DayRange::new(day(1), day(2))).unwrap().is_none());
        let other = TableKey::new("jitter-w30", "B");
        assert!(store.get(&other, DayRange::new(day(1), day(1))).unwrap().is_none());
    }

    #[test]
    fn unordered_rows_are_rejected() {
        let store = MemoryTableStore::new();
        let key = TableKey::new("x", "A");
        assert!(matches!(
            store.put(&key, &rows(&[5, 1])),
            Err(StorageError::Unordered { .. })
        ));
    }

    #[test]
    fn spanning_range() {
        let data = rows(&[3, 50]);
        let range = DayRange::spanning(&data).unwrap();
        assert_eq!(range, DayRange::new(day(1), day(3)));
        assert_eq!(range.days().count(), 3);
        assert!(DayRange::spanning::<Step<f64>>(&[]).is_none());
    }
}
