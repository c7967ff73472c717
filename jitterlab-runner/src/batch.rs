//! Batch fan-out: one sequence run per symbol.
//!
//! The jitter families run each symbol independently on the rayon pool.
//! The collective and momentum families need a cross-sectional stage: every
//! symbol's features are computed first, then aggregated or ranked on the
//! shared timeline, and only then are the per-symbol sequences run.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, info};

use jitterlab_core::domain::{PriceObservation, Symbol, TableKey};
use jitterlab_core::features::{
    apply_ranks, attach_collective, collective_series, compute_series, momentum_series,
    Aggregation, FeatureParam, FeatureRecord, MomentumParam,
};
use jitterlab_core::storage::{DayRange, TableStore};
use jitterlab_core::strategy::{
    CollectiveRecovery, Following, Momentum, Recovery, SimpleReversal,
};
use jitterlab_core::{run_sequence, Policy, SequenceTable, Step, StrategyConfig};

use crate::error::RunError;
use crate::loader::{AlignedPrices, PriceTable};
use crate::metrics::{RunSummary, SymbolSummary};

/// Store of per-symbol jitter feature tables, shared across runs.
pub type FeatureStore = dyn TableStore<Step<FeatureRecord>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOptions {
    pub aggregation: Aggregation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolRun {
    pub symbol: Symbol,
    pub table: SequenceTable,
    pub summary: SymbolSummary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub label: String,
    pub config: StrategyConfig,
    /// Ordered by symbol.
    pub runs: Vec<SymbolRun>,
    pub summary: RunSummary,
}

impl BatchResult {
    pub fn run(&self, symbol: &str) -> Option<&SymbolRun> {
        self.runs.iter().find(|r| r.symbol == symbol)
    }
}

pub fn run_batch(
    prices: &PriceTable,
    config: &StrategyConfig,
    options: &BatchOptions,
    store: &FeatureStore,
) -> Result<BatchResult, RunError> {
    config.validate()?;
    let label = config.label();
    info!(
        label = %label,
        symbols = prices.symbol_count(),
        observations = prices.observation_count(),
        "starting batch"
    );

    let tables: Vec<(Symbol, SequenceTable)> = match config {
        StrategyConfig::Recovery(p) => {
            run_independent(prices, &p.feature, &Recovery::new(p.clone()), store)?
        }
        StrategyConfig::Following(p) => {
            run_independent(prices, &p.feature, &Following::new(p.clone()), store)?
        }
        StrategyConfig::SimpleReversal(p) => {
            run_independent(prices, &p.feature, &SimpleReversal::new(p.clone()), store)?
        }
        StrategyConfig::CollectiveRecovery(p) => run_collective(
            prices,
            &CollectiveRecovery::new(p.clone()),
            &p.feature,
            p.collective_window,
            options.aggregation,
        ),
        StrategyConfig::Momentum(p) => {
            run_momentum(prices, &Momentum::new(p.clone()), &p.feature)
        }
    };

    let runs: Vec<SymbolRun> = tables
        .into_iter()
        .map(|(symbol, table)| {
            let summary = SymbolSummary::compute(&symbol, &table);
            debug!(
                symbol = %symbol,
                trades = summary.trades,
                profit = summary.total_profit,
                "symbol finished"
            );
            SymbolRun {
                symbol,
                table,
                summary,
            }
        })
        .collect();

    let summaries: Vec<SymbolSummary> = runs.iter().map(|r| r.summary.clone()).collect();
    let summary = RunSummary::compute(&summaries);
    info!(
        label = %label,
        trades = summary.trades,
        profit = summary.total_profit,
        "batch finished"
    );

    Ok(BatchResult {
        label,
        config: config.clone(),
        runs,
        summary,
    })
}

// ─── Jitter features ────────────────────────────────────────────────

fn build_steps(obs: &[PriceObservation], param: &FeatureParam) -> Vec<Step<FeatureRecord>> {
    let values: Vec<f64> = obs.iter().map(|o| o.value).collect();
    obs.iter()
        .zip(compute_series(&values, param))
        .map(|(o, rec)| Step::new(o.timestamp, o.value, rec))
        .collect()
}

/// Store key of a feature table. Warm-up rows depend on where the series
/// starts, so the first timestamp is part of the label.
pub fn feature_key(symbol: &str, param: &FeatureParam, start: DateTime<Utc>) -> TableKey {
    TableKey::new(format!("{}-from{}", param.label(), start.timestamp()), symbol)
}

/// Feature steps of one symbol, read from `store` when every day is
/// already there and matches the observations, computed and stored otherwise.
pub fn feature_steps(
    symbol: &str,
    obs: &[PriceObservation],
    param: &FeatureParam,
    store: &FeatureStore,
) -> Result<Vec<Step<FeatureRecord>>, RunError> {
    let (Some(range), Some(first)) = (DayRange::spanning(obs), obs.first()) else {
        return Ok(Vec::new());
    };
    let key = feature_key(symbol, param, first.timestamp);

    if let Some(cached) = store.get(&key, range)? {
        let matches = cached.len() == obs.len()
            && cached
                .iter()
                .zip(obs)
                .all(|(s, o)| s.timestamp == o.timestamp && s.value == o.value);
        if matches {
            debug!(key = %key, "feature table cache hit");
            return Ok(cached);
        }
    }

    let steps = build_steps(obs, param);
    store.put(&key, &steps)?;
    Ok(steps)
}

/// Feature tables of every symbol, in symbol order.
pub fn feature_tables(
    prices: &PriceTable,
    param: &FeatureParam,
    store: &FeatureStore,
) -> Result<Vec<(Symbol, Vec<Step<FeatureRecord>>)>, RunError> {
    let symbols: Vec<(&Symbol, &[PriceObservation])> = prices.iter().collect();
    symbols
        .into_par_iter()
        .map(|(symbol, obs)| -> Result<_, RunError> {
            Ok((symbol.clone(), feature_steps(symbol, obs, param, store)?))
        })
        .collect()
}

fn run_independent<P>(
    prices: &PriceTable,
    param: &FeatureParam,
    policy: &P,
    store: &FeatureStore,
) -> Result<Vec<(Symbol, SequenceTable)>, RunError>
where
    P: Policy<Feature = FeatureRecord>,
{
    let tables = feature_tables(prices, param, store)?
        .into_par_iter()
        .map(|(symbol, steps)| (symbol, run_sequence(&steps, policy)))
        .collect();
    Ok(tables)
}

// ─── Cross-sectional families ───────────────────────────────────────

/// One symbol placed on the shared timeline: the index of its first
/// observation and its forward-filled values from there on.
struct Placed<'a> {
    symbol: &'a Symbol,
    first: usize,
    values: Vec<f64>,
}

fn place(aligned: &AlignedPrices) -> Vec<Placed<'_>> {
    aligned
        .values
        .iter()
        .map(|(symbol, column)| {
            let first = column.iter().position(Option::is_some).unwrap_or(column.len());
            Placed {
                symbol,
                first,
                values: column[first..].iter().flatten().copied().collect(),
            }
        })
        .collect()
}

/// Left-pad a symbol's series to the full timeline.
fn pad<T: Clone>(first: usize, series: Vec<Option<T>>) -> Vec<Option<T>> {
    let mut out = vec![None; first];
    out.extend(series);
    out
}

fn sequence_on_timeline<P: Policy>(
    timeline: &[DateTime<Utc>],
    placed: &Placed<'_>,
    features: Vec<Option<P::Feature>>,
    policy: &P,
) -> SequenceTable
where
    P::Feature: Clone,
{
    let steps: Vec<Step<P::Feature>> = timeline[placed.first..]
        .iter()
        .zip(&placed.values)
        .zip(features.into_iter().skip(placed.first))
        .map(|((t, v), f)| Step::new(*t, *v, f))
        .collect();
    run_sequence(&steps, policy)
}

fn run_collective(
    prices: &PriceTable,
    policy: &CollectiveRecovery,
    param: &FeatureParam,
    collective_window: usize,
    how: Aggregation,
) -> Vec<(Symbol, SequenceTable)> {
    let aligned = prices.aligned();
    let placed = place(&aligned);

    let jitter: Vec<Vec<Option<FeatureRecord>>> = placed
        .par_iter()
        .map(|p| pad(p.first, compute_series(&p.values, param)))
        .collect();
    let collective = collective_series(&jitter, collective_window, how);

    placed
        .par_iter()
        .zip(jitter.par_iter())
        .map(|(p, records)| {
            let features = attach_collective(records, &collective);
            let table = sequence_on_timeline(&aligned.timeline, p, features, policy);
            (p.symbol.clone(), table)
        })
        .collect()
}

fn run_momentum(
    prices: &PriceTable,
    policy: &Momentum,
    param: &MomentumParam,
) -> Vec<(Symbol, SequenceTable)> {
    let aligned = prices.aligned();
    let placed = place(&aligned);

    let mut records: Vec<_> = placed
        .par_iter()
        .map(|p| pad(p.first, momentum_series(&p.values, param)))
        .collect();
    apply_ranks(&mut records);

    placed
        .par_iter()
        .zip(records.into_par_iter())
        .map(|(p, features)| {
            let table = sequence_on_timeline(&aligned.timeline, p, features, policy);
            (p.symbol.clone(), table)
        })
        .collect()
}
