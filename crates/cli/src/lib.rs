//! Command-line interface for metagrad.
//!
//! This crate provides commands to inspect the configuration and to run
//! inner-loop adaptation on a synthetic few-shot task.

#![deny(missing_docs, unsafe_code)]

/// CLI command definitions and parsing.
pub mod commands;

/// CLI application entry point and configuration.
pub mod app;

/// Error types for CLI operations.
pub mod error;

/// Synthetic few-shot classification tasks.
pub mod task;
