//! Per-symbol and per-run summaries of a sequence run.
//!
//! All profit figures are the policy-signed `profit` column; the raw
//! price-difference totals are carried alongside.

use serde::{Deserialize, Serialize};

use jitterlab_core::sequence::RoundTrip;
use jitterlab_core::SequenceTable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSummary {
    pub symbol: String,
    pub periods: usize,
    pub periods_in_market: usize,
    /// Round trips, including one still open at the end.
    pub trades: usize,
    pub closed_trades: usize,
    pub wins: usize,
    pub win_rate: f64,
    pub total_profit: f64,
    pub total_profit_raw: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
}

impl SymbolSummary {
    pub fn compute(symbol: &str, table: &SequenceTable) -> Self {
        let trips = table.round_trips();
        let closed: Vec<&RoundTrip> = trips.iter().filter(|t| t.is_closed()).collect();
        let profits: Vec<f64> = closed.iter().map(|t| t.profit).collect();
        let wins = profits.iter().filter(|p| **p > 0.0).count();

        Self {
            symbol: symbol.to_string(),
            periods: table.rows.len(),
            periods_in_market: periods_in_market(table),
            trades: trips.len(),
            closed_trades: closed.len(),
            wins,
            win_rate: win_rate(wins, closed.len()),
            total_profit: table.total_profit(),
            total_profit_raw: table.total_profit_raw(),
            best_trade: profits.iter().copied().fold(0.0, f64::max),
            worst_trade: profits.iter().copied().fold(0.0, f64::min),
        }
    }
}

/// Aggregate over every symbol of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub symbols: usize,
    pub trades: usize,
    pub closed_trades: usize,
    pub win_rate: f64,
    pub total_profit: f64,
    pub mean_profit_per_symbol: f64,
    pub exposure: f64,
    pub best_symbol: Option<String>,
    pub worst_symbol: Option<String>,
}

impl RunSummary {
    pub fn compute(symbols: &[SymbolSummary]) -> Self {
        let closed: usize = symbols.iter().map(|s| s.closed_trades).sum();
        let wins: usize = symbols.iter().map(|s| s.wins).sum();
        let total_profit: f64 = symbols.iter().map(|s| s.total_profit).sum();
        let periods: usize = symbols.iter().map(|s| s.periods).sum();
        let in_market: usize = symbols.iter().map(|s| s.periods_in_market).sum();

        let by_profit = |a: &&SymbolSummary, b: &&SymbolSummary| {
            a.total_profit.total_cmp(&b.total_profit)
        };

        Self {
            symbols: symbols.len(),
            trades: symbols.iter().map(|s| s.trades).sum(),
            closed_trades: closed,
            win_rate: win_rate(wins, closed),
            total_profit,
            mean_profit_per_symbol: if symbols.is_empty() {
                0.0
            } else {
                total_profit / symbols.len() as f64
            },
            exposure: if periods == 0 {
                0.0
            } else {
                in_market as f64 / periods as f64
            },
            best_symbol: symbols.iter().max_by(by_profit).map(|s| s.symbol.clone()),
            worst_symbol: symbols.iter().min_by(by_profit).map(|s| s.symbol.clone()),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

pub fn win_rate(wins: usize, closed: usize) -> f64 {
    if closed == 0 {
        0.0
    } else {
        wins as f64 / closed as f64
    }
}

/// Rows that ended with an open position.
pub fn periods_in_market(table: &SequenceTable) -> usize {
    table
        .rows
        .iter()
        .filter(|r| !r.position().is_flat())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use jitterlab_core::domain::Position;
    use jitterlab_core::{SequenceRow, TradeStatus};

    fn row(i: i64, value: f64, position: Position, profit: Option<f64>) -> SequenceRow {
        SequenceRow {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(i),
            value,
            status: TradeStatus {
                position,
                ..TradeStatus::default()
            },
            applied: true,
            position_changed: None,
            profit_raw: profit.map(|p| p * value),
            profit,
        }
    }

    fn table() -> SequenceTable {
        use Position::*;
        SequenceTable {
            policy: "test".into(),
            profit_sign: 1.0,
            rows: vec![
                row(0, 100.0, Flat, None),
                row(1, 100.0, Long, Some(0.0)),
                row(2, 110.0, Long, Some(0.1)),
                row(3, 108.0, Flat, Some(-0.02)),
                row(4, 108.0, Short, Some(0.0)),
                row(5, 110.0, Flat, Some(-0.05)),
                row(6, 110.0, Long, Some(0.0)),
            ],
        }
    }

    // ── 1. Symbol summary ──

    #[test]
    fn symbol_summary_counts_trips() {
        let s = SymbolSummary::compute("A", &table());
        assert_eq!(s.periods, 7);
        assert_eq!(s.periods_in_market, 4);
        assert_eq!(s.trades, 3);
        assert_eq!(s.closed_trades, 2);
        assert_eq!(s.wins, 1);
        assert!((s.win_rate - 0.5).abs() < 1e-12);
        assert!((s.total_profit - 0.03).abs() < 1e-12);
        assert!((s.best_trade - 0.08).abs() < 1e-12);
        assert!((s.worst_trade + 0.05).abs() < 1e-12);
    }

    #[test]
    fn empty_table_is_zeroed() {
        let empty = SequenceTable {
            policy: "test".into(),
            profit_sign: 1.0,
            rows: vec![],
        };
        let s = SymbolSummary::compute("A", &empty);
        assert_eq!(s.trades, 0);
        assert_eq!(s.win_rate, 0.0);
        assert_eq!(s.total_profit, 0.0);
    }

    // ── 2. Run summary ──

    #[test]
    fn run_summary_aggregates() {
        let a = SymbolSummary::compute("A", &table());
        let b = SymbolSummary {
            symbol: "B".into(),
            total_profit: -1.0,
            ..a.clone()
        };
        let run = RunSummary::compute(&[a, b]);
        assert_eq!(run.symbols, 2);
        assert_eq!(run.closed_trades, 4);
        assert!((run.win_rate - 0.5).abs() < 1e-12);
        assert_eq!(run.best_symbol.as_deref(), Some("A"));
        assert_eq!(run.worst_symbol.as_deref(), Some("B"));
        assert!((run.exposure - 4.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn run_summary_of_nothing() {
        let run = RunSummary::compute(&[]);
        assert_eq!(run.symbols, 0);
        assert_eq!(run.mean_profit_per_symbol, 0.0);
        assert!(run.best_symbol.is_none());
    }
}
