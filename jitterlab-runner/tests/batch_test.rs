//! Batch runs over synthetic data, one family at a time.

use jitterlab_core::features::{Aggregation, FeatureParam};
use jitterlab_core::storage::MemoryTableStore;
use jitterlab_core::strategy::{Recovery, RecoveryParams};
use jitterlab_core::{run_sequence, StrategyConfig};
use jitterlab_runner::batch::feature_steps;
use jitterlab_runner::config::RunConfig;
use jitterlab_runner::{generate, run_batch, BatchOptions, BatchResult, PriceTable, SynthConfig};
use proptest::prelude::*;

fn synth(seed: u64, periods: usize) -> PriceTable {
    generate(&SynthConfig {
        symbols: vec!["AAA".into(), "BBB".into(), "CCC".into()],
        periods,
        seed,
        jump_probability: 0.01,
        ..SynthConfig::default()
    })
    .unwrap()
}

fn run(prices: &PriceTable, preset: &str) -> BatchResult {
    let store = MemoryTableStore::new();
    let config = StrategyConfig::preset(preset).unwrap();
    run_batch(prices, &config, &BatchOptions::default(), &store).unwrap()
}

fn assert_trip_profit_matches_total(result: &BatchResult) {
    for r in &result.runs {
        let trips: f64 = r.table.round_trips().iter().map(|t| t.profit).sum();
        assert!(
            (trips - r.table.total_profit()).abs() < 1e-9,
            "{}: trips {trips} vs total {}",
            r.symbol,
            r.table.total_profit()
        );
    }
}

// ── 1. Every preset runs ──

#[test]
fn every_preset_produces_one_row_per_observation() {
    let prices = synth(1, 900);
    for preset in jitterlab_core::config::PRESETS {
        let result = run(&prices, preset);
        assert_eq!(result.runs.len(), 3, "{preset}");
        assert_eq!(result.summary.symbols, 3, "{preset}");
        for r in &result.runs {
            assert_eq!(r.table.rows.len(), 900, "{preset}/{}", r.symbol);
            assert!(r.table.rows[0].position_changed.is_none());
        }
        assert_trip_profit_matches_total(&result);
    }
}

#[test]
fn runs_are_ordered_by_symbol() {
    let result = run(&synth(2, 200), "recovery");
    let symbols: Vec<&str> = result.runs.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(symbols, ["AAA", "BBB", "CCC"]);
    assert!(result.run("BBB").is_some());
    assert!(result.label.starts_with("recovery-"));
}

// ── 2. Determinism ──

#[test]
fn identical_inputs_give_identical_results() {
    let prices = synth(3, 600);
    for preset in ["following", "collective_recovery", "momentum"] {
        assert_eq!(run(&prices, preset), run(&prices, preset), "{preset}");
    }
}

#[test]
fn fan_out_matches_a_single_symbol_run() {
    let prices = synth(4, 600);
    let result = run(&prices, "recovery");

    let store = MemoryTableStore::new();
    let params = RecoveryParams::default_params();
    let obs = prices.series("BBB").unwrap();
    let steps = feature_steps("BBB", obs, &params.feature, &store).unwrap();
    let alone = run_sequence(&steps, &Recovery::new(params));

    assert_eq!(result.run("BBB").unwrap().table, alone);
}

#[test]
fn shared_store_is_reused_across_runs() {
    let prices = synth(5, 300);
    let store = MemoryTableStore::new();
    let options = BatchOptions::default();
    let a = StrategyConfig::preset("recovery").unwrap();
    let b = StrategyConfig::preset("following").unwrap();

    run_batch(&prices, &a, &options, &store).unwrap();
    let partitions = store.partition_count();
    run_batch(&prices, &b, &options, &store).unwrap();
    // same feature window, so the second run reads the first run's tables
    assert_eq!(FeatureParam::default_params().label(), "jitter-w30");
    assert_eq!(store.partition_count(), partitions);
}

// ── 3. Cross-sectional families ──

#[test]
fn collective_waits_for_its_window() {
    let prices = synth(6, 400);
    let result = run(&prices, "collective_recovery");
    // feature window 40 plus a 30-period collective window
    for r in &result.runs {
        assert!(r.table.rows[..68].iter().all(|row| !row.applied));
        assert!(r.table.rows[68].applied);
    }
}

#[test]
fn collective_aggregation_is_configurable() {
    let prices = synth(7, 400);
    let config = StrategyConfig::preset("collective_recovery").unwrap();
    let store = MemoryTableStore::new();
    for aggregation in [Aggregation::Median, Aggregation::Mean] {
        let result = run_batch(&prices, &config, &BatchOptions { aggregation }, &store).unwrap();
        assert_eq!(result.runs.len(), 3);
    }
}

#[test]
fn momentum_changes_position_only_at_rebalance_instants() {
    let prices = synth(8, 2_000);
    let result = run(&prices, "momentum");
    let mut changes = 0;
    for r in &result.runs {
        for row in r.table.position_changes() {
            assert_eq!(row.timestamp.timestamp().rem_euclid(360 * 60), 0);
            changes += 1;
        }
    }
    assert!(changes > 0, "selection of 10 out of 3 symbols should trade");
}

// ── 4. Config-driven run ──

#[test]
fn run_config_drives_a_batch() {
    let config = RunConfig::from_toml(
        r#"
[strategy]
type = "SIMPLE_REVERSAL"
jump = 0.1

[synth]
symbols = ["X", "Y"]
periods = 500
"#,
    )
    .unwrap();
    let prices = config.load_prices().unwrap();
    let store = MemoryTableStore::new();
    let result = run_batch(&prices, &config.strategy, &config.options(), &store).unwrap();
    assert_eq!(result.runs.len(), 2);
    assert_eq!(result.config, config.strategy);
}

// ── 5. Properties ──

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn trip_profit_always_matches_total(seed in any::<u64>()) {
        let prices = synth(seed, 500);
        assert_trip_profit_matches_total(&run(&prices, "recovery"));
        assert_trip_profit_matches_total(&run(&prices, "simple_reversal"));
    }
}
