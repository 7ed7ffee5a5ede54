//! CLI command definitions for metagrad.

use clap::{Args, Parser, Subcommand, ValueEnum};
use metagrad_core::DeviceKind;
use std::path::PathBuf;

/// Main CLI application.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Logging verbosity
    #[arg(short, long, default_value_t = 0, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, env = "METAGRAD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Adapt a small classifier to a synthetic few-shot task
    Adapt(AdaptArgs),

    /// Show or write the configuration
    Config(ConfigArgs),
}

/// Inner-loop adaptation arguments. Unset values come from the configuration.
#[derive(Args, Debug)]
pub struct AdaptArgs {
    /// Number of inner-loop gradient steps
    #[arg(long)]
    pub steps: Option<usize>,

    /// Step size of each update
    #[arg(long)]
    pub step_size: Option<f64>,

    /// Use the first-order approximation
    #[arg(long)]
    pub first_order: bool,

    /// Compute device (auto, cpu, cuda, metal)
    #[arg(long)]
    pub device: Option<DeviceKind>,

    /// Support examples per class
    #[arg(long, default_value_t = 5)]
    pub shots: usize,

    /// Query examples per class
    #[arg(long, default_value_t = 15)]
    pub queries: usize,

    /// Hidden layer width
    #[arg(long, default_value_t = 16)]
    pub hidden: usize,

    /// Random seed for task sampling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Configuration command arguments.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Write the configuration to this path instead of printing it
    #[arg(long)]
    pub write: Option<PathBuf>,

    /// Print the default configuration file location
    #[arg(long)]
    pub show_path: bool,
}

/// Output formats.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human readable text.
    Text,
    /// JSON document.
    Json,
}
