//! Serializable run configuration.
//!
//! ```toml
//! input = "prices.csv"
//! aggregation = "mean"
//! output_dir = "out"
//!
//! [strategy]
//! type = "COLLECTIVE_RECOVERY"
//! collective_window = 20
//! ```
//!
//! Exactly one of `input` and `[synth]` provides the prices.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use jitterlab_core::domain::ConfigHash;
use jitterlab_core::features::Aggregation;
use jitterlab_core::StrategyConfig;

use crate::batch::BatchOptions;
use crate::error::RunError;
use crate::loader::PriceTable;
use crate::synth::{generate, SynthConfig};

/// Unique identifier for a run (content-addressable hash).
pub type RunId = ConfigHash;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub strategy: StrategyConfig,

    /// CSV price table with `timestamp,symbol,price` columns.
    #[serde(default)]
    pub input: Option<PathBuf>,

    #[serde(default)]
    pub synth: Option<SynthConfig>,

    #[serde(default)]
    pub aggregation: Aggregation,

    /// Where artifacts are written; nothing is written when absent.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl RunConfig {
    pub fn from_toml(text: &str) -> Result<Self, RunError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RunError> {
        self.strategy.validate()?;
        match (&self.input, &self.synth) {
            (Some(_), Some(_)) => Err(RunError::InvalidConfig(
                "set either `input` or `[synth]`, not both".into(),
            )),
            (None, None) => Err(RunError::InvalidConfig(
                "one of `input` or `[synth]` is required".into(),
            )),
            (None, Some(synth)) => synth.validate().map_err(RunError::InvalidConfig),
            (Some(_), None) => Ok(()),
        }
    }

    /// Two runs with identical configs share a run id.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_string(self).unwrap_or_default();
        ConfigHash::from_bytes(json.as_bytes())
    }

    pub fn options(&self) -> BatchOptions {
        BatchOptions {
            aggregation: self.aggregation,
        }
    }

    pub fn load_prices(&self) -> Result<PriceTable, RunError> {
        match (&self.input, &self.synth) {
            (Some(path), _) => Ok(PriceTable::load_csv(path)?),
            (None, Some(synth)) => Ok(generate(synth)?),
            (None, None) => Err(RunError::InvalidConfig("no price source".into())),
        }
    }
}
