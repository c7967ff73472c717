//! Price table loading.
//!
//! Input is a CSV of `timestamp,symbol,price` rows. Timestamps are RFC 3339
//! or integer epoch seconds. Rows of different symbols may interleave, but
//! each symbol's timestamps must be strictly increasing.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;

use jitterlab_core::domain::{PriceObservation, Symbol};

/// Errors from the price loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read price table: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed price table: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid timestamp '{value}' on row {row}")]
    Timestamp { row: usize, value: String },

    #[error("timestamps for '{symbol}' are not increasing: {prev} then {next}")]
    NonMonotonic {
        symbol: Symbol,
        prev: DateTime<Utc>,
        next: DateTime<Utc>,
    },

    #[error("non-finite price for '{symbol}' at {timestamp}")]
    NonFinite {
        symbol: Symbol,
        timestamp: DateTime<Utc>,
    },

    #[error("price table is empty")]
    Empty,
}

#[derive(Debug, Deserialize)]
struct PriceRow {
    timestamp: String,
    symbol: String,
    price: f64,
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<i64>() {
        return Utc.timestamp_opt(secs, 0).single();
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Validated per-symbol price series.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    series: BTreeMap<Symbol, Vec<PriceObservation>>,
}

/// Symbol series placed on a shared timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPrices {
    pub timeline: Vec<DateTime<Utc>>,
    /// Per symbol, one value per timeline slot: absent before the symbol's
    /// first observation, forward filled after it.
    pub values: BTreeMap<Symbol, Vec<Option<f64>>>,
}

impl PriceTable {
    pub fn from_series(series: BTreeMap<Symbol, Vec<PriceObservation>>) -> Result<Self, LoadError> {
        if series.values().all(Vec::is_empty) {
            return Err(LoadError::Empty);
        }
        for (symbol, obs) in &series {
            for w in obs.windows(2) {
                if w[1].timestamp <= w[0].timestamp {
                    return Err(LoadError::NonMonotonic {
                        symbol: symbol.clone(),
                        prev: w[0].timestamp,
                        next: w[1].timestamp,
                    });
                }
            }
            if let Some(bad) = obs.iter().find(|o| !o.value.is_finite()) {
                return Err(LoadError::NonFinite {
                    symbol: symbol.clone(),
                    timestamp: bad.timestamp,
                });
            }
        }
        Ok(Self { series })
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LoadError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut series: BTreeMap<Symbol, Vec<PriceObservation>> = BTreeMap::new();
        for (i, row) in rdr.deserialize::<PriceRow>().enumerate() {
            let row = row?;
            let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| LoadError::Timestamp {
                row: i + 1,
                value: row.timestamp.clone(),
            })?;
            series
                .entry(row.symbol)
                .or_default()
                .push(PriceObservation::new(timestamp, row.price));
        }
        Self::from_series(series)
    }

    pub fn load_csv(path: &Path) -> Result<Self, LoadError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.series.keys()
    }

    pub fn series(&self, symbol: &str) -> Option<&[PriceObservation]> {
        self.series.get(symbol).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &[PriceObservation])> {
        self.series.iter().map(|(s, o)| (s, o.as_slice()))
    }

    pub fn symbol_count(&self) -> usize {
        self.series.len()
    }

    pub fn observation_count(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    /// Every observation ordered by `(timestamp, symbol)`, as a live feed would deliver them.
    pub fn interleaved(&self) -> Vec<(DateTime<Utc>, &Symbol, f64)> {
        let mut rows: Vec<_> = self
            .series
            .iter()
            .flat_map(|(s, obs)| obs.iter().map(move |o| (o.timestamp, s, o.value)))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
        rows
    }

    pub fn aligned(&self) -> AlignedPrices {
        let mut timeline: Vec<DateTime<Utc>> = self
            .series
            .values()
            .flat_map(|obs| obs.iter().map(|o| o.timestamp))
            .collect();
        timeline.sort();
        timeline.dedup();

        let values = self
            .series
            .iter()
            .map(|(symbol, obs)| {
                let mut out = Vec::with_capacity(timeline.len());
                let mut next = obs.iter().peekable();
                let mut last: Option<f64> = None;
                for t in &timeline {
                    while let Some(o) = next.next_if(|o| o.timestamp <= *t) {
                        last = Some(o.value);
                    }
                    out.push(last);
                }
                (symbol.clone(), out)
            })
            .collect();

        AlignedPrices { timeline, values }
    }
}
