//! Error types for CLI operations.

use thiserror::Error;

/// Main error type for CLI operations.
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid argument error.
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// Meta-learning operation error.
    #[error(transparent)]
    Meta(#[from] metagrad::MetaError),

    /// Core error.
    #[error(transparent)]
    Core(#[from] metagrad_core::Error),

    /// Tensor error outside the meta-learning helpers.
    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Output serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result alias for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;
