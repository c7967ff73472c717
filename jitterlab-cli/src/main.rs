//! JitterLab CLI: synthetic data, feature tables, batch backtests and live replay.
//!
//! Commands:
//! - `synth`: generate a synthetic price table as CSV
//! - `features`: compute jitter feature tables for a price CSV
//! - `backtest`: run a strategy family over every symbol from a TOML config or preset
//! - `replay`: stream a price CSV through the live path and print execution requests

mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Duration;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use jitterlab_core::config::PRESETS;
use jitterlab_core::features::{Aggregation, CollectiveTracker, FeatureParam, RankBoard};
use jitterlab_core::live::{
    CollectiveFeatures, ExecutionRequest, FeatureBuilder, JitterFeatures, LiveTrader,
    MomentumFeatures, RecordingExecutor,
};
use jitterlab_core::storage::MemoryTableStore;
use jitterlab_core::strategy::{
    CollectiveRecovery, Following, Momentum, Recovery, SimpleReversal,
};
use jitterlab_core::{Policy, StrategyConfig};
use jitterlab_runner::export::{export_json, generate_report, RunReport};
use jitterlab_runner::{
    export_features_csv, export_prices_csv, feature_tables, generate, run_batch, save_artifacts,
    PriceTable, RunConfig, SynthConfig,
};

#[derive(Parser)]
#[command(
    name = "jitterlab",
    about = "JitterLab CLI: extremum-change features and position state machines"
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic price table.
    Synth {
        #[arg(long, num_args = 1.., default_values = ["AAA", "BBB", "CCC"])]
        symbols: Vec<String>,

        #[arg(long, default_value_t = 2_000)]
        periods: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Output CSV. Written to stdout when absent.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Compute jitter feature tables for every symbol of a price CSV.
    Features {
        #[arg(long)]
        input: PathBuf,

        #[arg(long, default_value_t = 30)]
        window: usize,

        /// Output CSV. Written to stdout when absent.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run a strategy over every symbol from a TOML config file or named preset.
    Backtest {
        /// Path to a TOML run config.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Named strategy preset (see `--list-presets`).
        #[arg(long)]
        preset: Option<String>,

        /// Price CSV for `--preset`; synthetic data is used when absent.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Seed of the synthetic data for `--preset`.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(long, value_enum, default_value_t = AggregationArg::Median)]
        aggregation: AggregationArg,

        /// Artifact directory; overrides the config's `output_dir`.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Print the JSON report instead of the Markdown summary.
        #[arg(long, default_value_t = false)]
        json: bool,

        #[arg(long, default_value_t = false)]
        list_presets: bool,
    },
    /// Stream a price CSV through the live path, one observation at a time.
    Replay {
        #[arg(long)]
        input: PathBuf,

        #[arg(long, default_value = "recovery")]
        preset: String,

        /// Candle period in minutes.
        #[arg(long, default_value_t = 1)]
        period_minutes: i64,

        #[arg(long, value_enum, default_value_t = AggregationArg::Median)]
        aggregation: AggregationArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum AggregationArg {
    Median,
    Mean,
}

impl From<AggregationArg> for Aggregation {
    fn from(arg: AggregationArg) -> Self {
        match arg {
            AggregationArg::Median => Aggregation::Median,
            AggregationArg::Mean => Aggregation::Mean,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.json_logs);

    match cli.command {
        Commands::Synth {
            symbols,
            periods,
            seed,
            output,
        } => run_synth(symbols, periods, seed, output.as_deref()),
        Commands::Features {
            input,
            window,
            output,
        } => run_features(&input, window, output.as_deref()),
        Commands::Backtest {
            config,
            preset,
            input,
            seed,
            aggregation,
            output_dir,
            json,
            list_presets,
        } => {
            if list_presets {
                for name in PRESETS {
                    println!("{name}");
                }
                return Ok(());
            }
            let run = build_run_config(config, preset, input, seed, aggregation.into())?;
            run_backtest_cmd(run, output_dir, json)
        }
        Commands::Replay {
            input,
            preset,
            period_minutes,
            aggregation,
        } => run_replay(&input, &preset, period_minutes, aggregation.into()),
    }
}

fn write_output(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "wrote output");
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn run_synth(symbols: Vec<String>, periods: usize, seed: u64, output: Option<&Path>) -> Result<()> {
    let config = SynthConfig {
        symbols,
        periods,
        seed,
        ..SynthConfig::default()
    };
    if let Err(reason) = config.validate() {
        bail!(reason);
    }
    let prices = generate(&config)?;
    write_output(&export_prices_csv(&prices)?, output)
}

fn run_features(input: &Path, window: usize, output: Option<&Path>) -> Result<()> {
    if window == 0 {
        bail!("--window must be positive");
    }
    let prices = PriceTable::load_csv(input)?;
    let store = MemoryTableStore::new();
    let tables = feature_tables(&prices, &FeatureParam::new(window), &store)?;
    write_output(&export_features_csv(&tables)?, output)
}

fn build_run_config(
    config_path: Option<PathBuf>,
    preset: Option<String>,
    input: Option<PathBuf>,
    seed: u64,
    aggregation: Aggregation,
) -> Result<RunConfig> {
    match (config_path, preset) {
        (Some(_), Some(_)) => bail!("--config and --preset are mutually exclusive"),
        (None, None) => bail!("one of --config or --preset is required"),
        (Some(path), None) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok(RunConfig::from_toml(&text)?)
        }
        (None, Some(name)) => {
            let synth = input.is_none().then(|| SynthConfig {
                seed,
                ..SynthConfig::default()
            });
            let run = RunConfig {
                strategy: StrategyConfig::preset(&name)?,
                input,
                synth,
                aggregation,
                output_dir: None,
            };
            run.validate()?;
            Ok(run)
        }
    }
}

fn run_backtest_cmd(run: RunConfig, output_dir: Option<PathBuf>, json: bool) -> Result<()> {
    info!(run_id = %run.run_id().short(16), family = run.strategy.family(), "backtest");
    let prices = run.load_prices()?;
    let store = MemoryTableStore::new();
    let result = run_batch(&prices, &run.strategy, &run.options(), &store)?;

    let report = RunReport::from_result(&result);
    if json {
        println!("{}", export_json(&report)?);
    } else {
        print!("{}", generate_report(&report));
    }

    if let Some(dir) = output_dir.or(run.output_dir) {
        let run_dir = save_artifacts(&result, &dir)?;
        info!(path = %run_dir.display(), "artifacts saved");
    }
    Ok(())
}

// ─── Replay ─────────────────────────────────────────────────────────

fn run_replay(input: &Path, preset: &str, period_minutes: i64, how: Aggregation) -> Result<()> {
    if period_minutes <= 0 {
        bail!("--period-minutes must be positive");
    }
    let prices = PriceTable::load_csv(input)?;
    let period = Duration::minutes(period_minutes);

    let requests = match StrategyConfig::preset(preset)? {
        StrategyConfig::Recovery(p) => {
            let builder = JitterFeatures { param: p.feature };
            replay(&prices, Recovery::new(p), builder, period)?
        }
        StrategyConfig::Following(p) => {
            let builder = JitterFeatures { param: p.feature };
            replay(&prices, Following::new(p), builder, period)?
        }
        StrategyConfig::SimpleReversal(p) => {
            let builder = JitterFeatures { param: p.feature };
            replay(&prices, SimpleReversal::new(p), builder, period)?
        }
        StrategyConfig::CollectiveRecovery(p) => {
            let builder = CollectiveFeatures {
                param: p.feature,
                tracker: Arc::new(CollectiveTracker::new(p.collective_window, how)),
            };
            replay(&prices, CollectiveRecovery::new(p), builder, period)?
        }
        StrategyConfig::Momentum(p) => {
            let builder = MomentumFeatures {
                param: p.feature,
                board: Arc::new(RankBoard::new()),
            };
            replay(&prices, Momentum::new(p), builder, period)?
        }
    };

    for request in &requests {
        println!("{}", serde_json::to_string(request)?);
    }
    info!(requests = requests.len(), "replay finished");
    Ok(())
}

fn replay<P, B>(
    prices: &PriceTable,
    policy: P,
    builder: B,
    period: Duration,
) -> Result<Vec<ExecutionRequest>>
where
    P: Policy,
    B: FeatureBuilder<Feature = P::Feature>,
{
    let trader = LiveTrader::new(policy, builder, RecordingExecutor::new(), period);
    for (timestamp, symbol, price) in prices.interleaved() {
        let update = trader.on_price(symbol, timestamp, price)?;
        if let Some(failed) = update.failed.into_iter().next() {
            return Err(failed.error.into());
        }
    }
    Ok(trader.executor().requests())
}
