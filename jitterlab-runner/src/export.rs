//! Reporting and export: JSON, CSV and Markdown artifacts.
//!
//! - **JSON**: the run report (config, fingerprint, summaries) with a schema version
//! - **CSV**: price tables, feature tables, per-row sequence output, round trips
//! - **Markdown**: a short human-readable summary
//!
//! Reports carry a `schema_version`; newer versions are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use jitterlab_core::domain::ConfigHash;
use jitterlab_core::features::FeatureRecord;
use jitterlab_core::{Step, StrategyConfig};

use crate::batch::{BatchResult, SymbolRun};
use crate::loader::PriceTable;
use crate::metrics::{RunSummary, SymbolSummary};

pub const SCHEMA_VERSION: u32 = 1;

/// Persisted form of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub schema_version: u32,
    pub label: String,
    pub fingerprint: ConfigHash,
    pub config: StrategyConfig,
    pub summary: RunSummary,
    pub symbols: Vec<SymbolSummary>,
}

impl RunReport {
    pub fn from_result(result: &BatchResult) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            label: result.label.clone(),
            fingerprint: result.config.fingerprint(),
            config: result.config.clone(),
            summary: result.summary.clone(),
            symbols: result.runs.iter().map(|r| r.summary.clone()).collect(),
        }
    }
}

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize RunReport to JSON")
}

/// Deserialize a `RunReport`, rejecting schema versions newer than this build.
pub fn import_json(json: &str) -> Result<RunReport> {
    let report: RunReport =
        serde_json::from_str(json).context("failed to deserialize RunReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV export ─────────────────────────────────────────────────────

fn opt(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.8}")).unwrap_or_default()
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Price table in the loader's input format.
pub fn export_prices_csv(prices: &PriceTable) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp", "symbol", "price"])?;
    for (timestamp, symbol, price) in prices.interleaved() {
        wtr.write_record([&timestamp.to_rfc3339(), symbol, &format!("{price:.8}")])?;
    }
    finish(wtr)
}

/// Jitter feature tables. Feature columns are empty before the window fills.
pub fn export_features_csv(tables: &[(String, Vec<Step<FeatureRecord>>)]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "timestamp",
        "symbol",
        "value",
        "ch",
        "ch_max",
        "ch_min",
        "distance_max_ch",
        "distance_min_ch",
        "ch_since_max",
        "ch_since_min",
        "v_ch_max_is_from",
        "v_ch_max_is_to",
        "v_ch_min_is_from",
        "v_ch_min_is_to",
        "avg_v_before_max_ch",
        "avg_v_before_min_ch",
    ])?;

    for (symbol, steps) in tables {
        for step in steps {
            let f = step.feature.as_ref();
            let field = |get: fn(&FeatureRecord) -> f64| opt(f.map(get));
            let distance = |get: fn(&FeatureRecord) -> usize| {
                f.map(|r| get(r).to_string()).unwrap_or_default()
            };
            wtr.write_record([
                step.timestamp.to_rfc3339(),
                symbol.clone(),
                format!("{:.8}", step.value),
                field(|r| r.ch),
                field(|r| r.ch_max),
                field(|r| r.ch_min),
                distance(|r| r.distance_max_ch),
                distance(|r| r.distance_min_ch),
                field(|r| r.ch_since_max),
                field(|r| r.ch_since_min),
                field(|r| r.v_ch_max_is_from),
                field(|r| r.v_ch_max_is_to),
                field(|r| r.v_ch_min_is_from),
                field(|r| r.v_ch_min_is_to),
                field(|r| r.avg_v_before_max_ch),
                field(|r| r.avg_v_before_min_ch),
            ])?;
        }
    }
    finish(wtr)
}

/// One row per input step of every symbol.
pub fn export_sequence_csv(runs: &[SymbolRun]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "timestamp",
        "symbol",
        "value",
        "in_position",
        "applied",
        "value_at_enter",
        "periods_since_enter",
        "ch_from_enter",
        "ch_from_lowest_since_enter",
        "ch_from_highest_since_enter",
        "position_changed",
        "profit_raw",
        "profit",
    ])?;

    for run in runs {
        for row in &run.table.rows {
            let s = &row.status;
            wtr.write_record([
                row.timestamp.to_rfc3339(),
                run.symbol.clone(),
                format!("{:.8}", row.value),
                s.in_position().to_string(),
                row.applied.to_string(),
                format!("{:.8}", s.value_at_enter),
                s.periods_since_enter.to_string(),
                format!("{:.8}", s.ch_from_enter),
                format!("{:.8}", s.ch_from_lowest_since_enter),
                format!("{:.8}", s.ch_from_highest_since_enter),
                row.position_changed.map(|d| d.to_string()).unwrap_or_default(),
                opt(row.profit_raw),
                opt(row.profit),
            ])?;
        }
    }
    finish(wtr)
}

/// Round trips of every symbol, open ones with empty exit columns.
pub fn export_trips_csv(runs: &[SymbolRun]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "symbol",
        "side",
        "entered_at",
        "entry_value",
        "exited_at",
        "exit_value",
        "exit_reason",
        "periods",
        "profit",
        "profit_raw",
    ])?;

    for run in runs {
        for trip in run.table.round_trips() {
            wtr.write_record([
                run.symbol.clone(),
                format!("{:?}", trip.side),
                trip.entered_at.to_rfc3339(),
                format!("{:.8}", trip.entry_value),
                trip.exited_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
                opt(trip.exit_value),
                trip.exit_reason
                    .map(|r| format!("{r:?}"))
                    .unwrap_or_default(),
                trip.periods.to_string(),
                format!("{:.8}", trip.profit),
                format!("{:.8}", trip.profit_raw),
            ])?;
        }
    }
    finish(wtr)
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the artifact set of a batch run under `output_dir/{label}/`:
/// `report.json`, `sequence.csv` and `trips.csv`.
///
/// Returns the path to the created directory.
pub fn save_artifacts(result: &BatchResult, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(&result.label);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let json = export_json(&RunReport::from_result(result))?;
    std::fs::write(run_dir.join("report.json"), json)?;

    let sequence = export_sequence_csv(&result.runs)?;
    std::fs::write(run_dir.join("sequence.csv"), sequence)?;

    let trips = export_trips_csv(&result.runs)?;
    std::fs::write(run_dir.join("trips.csv"), trips)?;

    Ok(run_dir)
}

pub fn load_report(dir: &Path) -> Result<RunReport> {
    let path = dir.join("report.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

// ─── Markdown report ────────────────────────────────────────────────

pub fn generate_report(report: &RunReport) -> String {
    let s = &report.summary;
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", report.label));
    out.push_str(&format!("Fingerprint: `{}`\n\n", report.fingerprint.short(16)));
    out.push_str("| Metric | Value |\n|---|---|\n");
    out.push_str(&format!("| Symbols | {} |\n", s.symbols));
    out.push_str(&format!("| Trades | {} ({} closed) |\n", s.trades, s.closed_trades));
    out.push_str(&format!("| Win rate | {:.1}% |\n", s.win_rate * 100.0));
    out.push_str(&format!("| Total profit | {:.4} |\n", s.total_profit));
    out.push_str(&format!("| Exposure | {:.1}% |\n", s.exposure * 100.0));
    if let (Some(best), Some(worst)) = (&s.best_symbol, &s.worst_symbol) {
        out.push_str(&format!("| Best / worst | {best} / {worst} |\n"));
    }

    out.push_str("\n| Symbol | Trades | Win rate | Profit | Raw |\n|---|---|---|---|---|\n");
    for sym in &report.symbols {
        out.push_str(&format!(
            "| {} | {} | {:.1}% | {:.4} | {:.4} |\n",
            sym.symbol,
            sym.trades,
            sym.win_rate * 100.0,
            sym.total_profit,
            sym.total_profit_raw
        ));
    }
    out
}
