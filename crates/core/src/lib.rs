//! Core configuration, errors, and constants for metagrad.
//!
//! This crate holds the pieces shared by the meta-learning utilities and the
//! command-line front end: the TOML-backed configuration model, the core error
//! type, and the default hyper-parameters of the inner loop.

pub mod config;
pub mod constants;
pub mod error;

// Re-exports for convenience
pub use config::{DeviceConfig, DeviceKind, InnerLoopConfig, LoggingConfig, MetagradConfig};
pub use error::{Error, Result};
