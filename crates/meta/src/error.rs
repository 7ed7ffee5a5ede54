//! Error types for meta-learning operations.

use thiserror::Error;

/// Main error type for meta-learning operations.
#[derive(Error, Debug)]
pub enum MetaError {
    /// Candle tensor error.
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Tensor shapes do not fit the operation.
    #[error("Shape error: {0}")]
    Shape(String),

    /// Input of a kind the operation does not handle.
    #[error("Unsupported type: {0}")]
    Unsupported(String),

    /// Per-parameter step sizes lack an entry for a parameter.
    #[error("No step size for parameter '{0}'")]
    MissingStepSize(String),

    /// The loss does not depend on a parameter it is differentiated against.
    #[error("Parameter '{0}' was not used to compute the loss")]
    UnusedParameter(String),

    /// Requested device could not be created.
    #[error("Device error: {0}")]
    Device(String),

    /// Neural network operation error.
    #[error("Neural network error: {0}")]
    NeuralNetwork(String),
}

/// Result alias for meta-learning operations.
pub type Result<T> = std::result::Result<T, MetaError>;
