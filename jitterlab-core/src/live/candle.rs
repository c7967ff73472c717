//! Bounded per-symbol window of period closes.
//!
//! Observations are bucketed into fixed periods. Within a period the latest
//! observation replaces the previous one. When a later period arrives, the
//! open period closes, any skipped periods are forward filled with its close,
//! and every closed period is reported with the window as of its close.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, TimeZone, Utc};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CandleError {
    #[error("observation at {got} is older than the open period {open}")]
    OutOfOrder {
        got: DateTime<Utc>,
        open: DateTime<Utc>,
    },
    #[error("timestamp {0} cannot be bucketed")]
    Unrepresentable(i64),
}

/// A period that has just closed.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedCandle {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    /// Closed values up to and including this one, oldest first.
    pub window: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct CandleWindow {
    period_secs: i64,
    capacity: usize,
    closed: VecDeque<f64>,
    open: Option<(DateTime<Utc>, f64)>,
}

impl CandleWindow {
    pub fn new(period: Duration, capacity: usize) -> Self {
        assert!(period.num_seconds() > 0, "period must be at least one second");
        assert!(capacity > 0, "capacity must be > 0");
        Self {
            period_secs: period.num_seconds(),
            capacity,
            closed: VecDeque::with_capacity(capacity + 1),
            open: None,
        }
    }

    /// Start of the period containing `timestamp`.
    pub fn bucket(&self, timestamp: DateTime<Utc>) -> Result<DateTime<Utc>, CandleError> {
        let secs = timestamp.timestamp();
        let start = secs - secs.rem_euclid(self.period_secs);
        Utc.timestamp_opt(start, 0)
            .single()
            .ok_or(CandleError::Unrepresentable(start))
    }

    /// Feed one observation; returns the periods it closed, oldest first.
    pub fn push(
        &mut self,
        timestamp: DateTime<Utc>,
        value: f64,
    ) -> Result<Vec<ClosedCandle>, CandleError> {
        let bucket = self.bucket(timestamp)?;
        let Some((open_at, open_value)) = self.open else {
            self.open = Some((bucket, value));
            return Ok(Vec::new());
        };

        if bucket < open_at {
            return Err(CandleError::OutOfOrder {
                got: timestamp,
                open: open_at,
            });
        }
        if bucket == open_at {
            self.open = Some((open_at, value));
            return Ok(Vec::new());
        }

        let step = Duration::seconds(self.period_secs);
        let mut out = vec![self.close(open_at, open_value)];
        let mut t = open_at + step;
        while t < bucket {
            out.push(self.close(t, open_value));
            t += step;
        }
        self.open = Some((bucket, value));
        Ok(out)
    }

    fn close(&mut self, timestamp: DateTime<Utc>, value: f64) -> ClosedCandle {
        self.closed.push_back(value);
        if self.closed.len() > self.capacity {
            self.closed.pop_front();
        }
        ClosedCandle {
            timestamp,
            value,
            window: self.closed.iter().copied().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.closed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(minute: i64, second: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_040 + minute * 60 + second, 0).unwrap()
    }

    #[test]
    fn same_period_replaces_value() {
        let mut w = CandleWindow::new(Duration::minutes(1), 3);
        assert!(w.push(at(0, 0), 1.0).unwrap().is_empty());
        assert!(w.push(at(0, 30), 2.0).unwrap().is_empty());
        let closed = w.push(at(1, 5), 3.0).unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].timestamp, at(0, 0));
        assert_eq!(closed[0].value, 2.0);
        assert_eq!(closed[0].window, vec![2.0]);
    }

    #[test]
    fn gaps_are_forward_filled() {
        let mut w = CandleWindow::new(Duration::minutes(1), 10);
        w.push(at(0, 0), 5.0).unwrap();
        let closed = w.push(at(3, 0), 7.0).unwrap();
        let stamps: Vec<_> = closed.iter().map(|c| c.timestamp).collect();
        assert_eq!(stamps, vec![at(0, 0), at(1, 0), at(2, 0)]);
        assert_eq!(closed[2].window, vec![5.0, 5.0, 5.0]);
    }

    #[test]
    fn window_drops_oldest() {
        let mut w = CandleWindow::new(Duration::minutes(1), 2);
        for (i, v) in [1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
            w.push(at(i as i64, 0), v).unwrap();
        }
        assert_eq!(w.len(), 2);
        let closed = w.push(at(4, 0), 5.0).unwrap();
        assert_eq!(closed[0].window, vec![3.0, 4.0]);
    }

    #[test]
    fn older_period_is_rejected() {
        let mut w = CandleWindow::new(Duration::minutes(1), 2);
        w.push(at(5, 0), 1.0).unwrap();
        assert!(matches!(
            w.push(at(4, 0), 1.0),
            Err(CandleError::OutOfOrder { .. })
        ));
    }
}
