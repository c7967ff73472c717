use thiserror::Error;

use jitterlab_core::storage::StorageError;
use jitterlab_core::ConfigError;

use crate::loader::LoadError;

/// Errors from batch orchestration.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Strategy(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to parse run config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid run config: {0}")]
    InvalidConfig(String),
}
