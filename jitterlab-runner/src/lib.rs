//! JitterLab Runner: batch orchestration over `jitterlab-core`.
//!
//! - Price loading from CSV and synthetic generation
//! - Per-symbol fan-out on the rayon pool, with cross-sectional stages for
//!   the collective and momentum families
//! - Memoized feature tables through the core storage port
//! - Per-symbol and per-run summaries
//! - JSON, CSV and Markdown export

pub mod batch;
pub mod config;
pub mod error;
pub mod export;
pub mod loader;
pub mod metrics;
pub mod synth;

pub use batch::{feature_tables, run_batch, BatchOptions, BatchResult, SymbolRun};
pub use config::{RunConfig, RunId};
pub use error::RunError;
pub use export::{
    export_features_csv, export_prices_csv, import_json, save_artifacts, RunReport,
    SCHEMA_VERSION,
};
pub use loader::{LoadError, PriceTable};
pub use metrics::{RunSummary, SymbolSummary};
pub use synth::{generate, SynthConfig};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn results_are_send_sync() {
        assert_send::<BatchResult>();
        assert_sync::<BatchResult>();
        assert_send::<RunReport>();
        assert_sync::<RunReport>();
    }

    #[test]
    fn inputs_are_send_sync() {
        assert_send::<PriceTable>();
        assert_sync::<PriceTable>();
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<RunError>();
        assert_sync::<RunError>();
    }
}
