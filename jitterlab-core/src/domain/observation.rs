use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single price point of one symbol. Produced externally, ordered by timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl PriceObservation {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Extract the value column of an observation slice.
pub fn values(observations: &[PriceObservation]) -> Vec<f64> {
    observations.iter().map(|o| o.value).collect()
}
