//! CLI application entry point and configuration.
//!
//! This module provides the main CLI application logic, including argument parsing,
//! configuration loading, and command dispatch.

use crate::commands::{AdaptArgs, Cli, Commands, ConfigArgs, OutputFormat};
use crate::error::{CliError, Result};
use crate::task::{SyntheticTask, FEATURE_DIM};
use candle_core::Tensor;
use clap::Parser;
use metagrad::{
    compute_accuracy, enable_second_order, gradient_update_parameters, resolve_device,
    tensors_to_device, Activation, MetaModule, MetaParams, MetaSequential, MetaSequentialBuilder,
    StepSize,
};
use metagrad_core::config::LogLevel;
use metagrad_core::MetagradConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, Level};

/// Main CLI application.
#[derive(Debug)]
pub struct App {
    /// Loaded configuration.
    pub config: MetagradConfig,
    /// Parsed CLI arguments.
    pub cli: Cli,
}

/// Outcome of an adaptation run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptReport {
    /// Device the run used.
    pub device: String,
    /// Number of inner-loop steps.
    pub steps: usize,
    /// Step size of each update.
    pub step_size: f64,
    /// Whether gradients were treated as constants.
    pub first_order: bool,
    /// Support loss with the initial parameters.
    pub support_loss_before: f32,
    /// Support loss with the adapted parameters.
    pub support_loss_after: f32,
    /// Query accuracy with the initial parameters.
    pub query_accuracy_before: f32,
    /// Query accuracy with the adapted parameters.
    pub query_accuracy_after: f32,
}

impl App {
    /// Create a new application instance from command line arguments.
    pub fn new() -> Result<Self> {
        let cli = Cli::parse();
        let config = Self::load_config(&cli)?;
        Ok(Self { config, cli })
    }

    /// Load configuration from the given file, or the default location if present.
    fn load_config(cli: &Cli) -> Result<MetagradConfig> {
        if let Some(config_path) = &cli.config {
            if !config_path.exists() {
                return Err(CliError::Config(format!(
                    "Configuration file not found: {}",
                    config_path.display()
                )));
            }
            return Ok(MetagradConfig::load(config_path)?);
        }

        match MetagradConfig::default_path() {
            Ok(path) if path.exists() => Ok(MetagradConfig::load(&path)?),
            _ => Ok(MetagradConfig::default()),
        }
    }

    /// Run the application.
    pub fn run(self) -> Result<()> {
        self.setup_logging();

        match &self.cli.command {
            Commands::Adapt(args) => self.handle_adapt(args),
            Commands::Config(args) => self.handle_config(args),
        }
    }

    /// Set up logging based on verbosity level and configuration.
    fn setup_logging(&self) {
        let level = match self.cli.verbose {
            0 => match self.config.logging.level {
                LogLevel::Error => Level::ERROR,
                LogLevel::Warn => Level::WARN,
                LogLevel::Info => Level::INFO,
                LogLevel::Debug => Level::DEBUG,
                LogLevel::Trace => Level::TRACE,
            },
            1 => Level::DEBUG,
            _ => Level::TRACE,
        };

        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init()
            .ok(); // Ignore errors if a subscriber is already installed
    }

    fn handle_adapt(&self, args: &AdaptArgs) -> Result<()> {
        let mut config = self.config.clone();
        if let Some(steps) = args.steps {
            config.inner_loop.num_steps = steps;
        }
        if let Some(step_size) = args.step_size {
            config.inner_loop.step_size = step_size;
        }
        if args.first_order {
            config.inner_loop.first_order = true;
        }
        if let Some(kind) = args.device {
            config.device.kind = kind;
        }
        config.validate()?;

        if args.shots == 0 || args.queries == 0 || args.hidden == 0 {
            return Err(CliError::Argument(
                "--shots, --queries and --hidden must be positive".to_string(),
            ));
        }

        let mut rng = match args.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let report = run_adaptation(&config, &mut rng, args.shots, args.queries, args.hidden)?;

        match args.format {
            OutputFormat::Json => println!(
                "{}",
                serde_json::to_string_pretty(&report)
                    .map_err(|e| CliError::Serialization(e.to_string()))?
            ),
            OutputFormat::Text => {
                println!("device:          {}", report.device);
                println!(
                    "inner loop:      {} step(s), step size {}, {}",
                    report.steps,
                    report.step_size,
                    if report.first_order {
                        "first order"
                    } else {
                        "full order"
                    }
                );
                println!(
                    "support loss:    {:.4} -> {:.4}",
                    report.support_loss_before, report.support_loss_after
                );
                println!(
                    "query accuracy:  {:.2}% -> {:.2}%",
                    report.query_accuracy_before * 100.0,
                    report.query_accuracy_after * 100.0
                );
            }
        }
        Ok(())
    }

    fn handle_config(&self, args: &ConfigArgs) -> Result<()> {
        if args.show_path {
            println!("{}", MetagradConfig::default_path()?.display());
            return Ok(());
        }

        match &args.write {
            Some(path) => {
                self.config.save(path)?;
                info!(path = %path.display(), "configuration written");
            }
            None => print!("{}", self.config.to_toml()?),
        }
        Ok(())
    }
}

/// Adapt a fresh classifier to one synthetic task and measure the effect.
pub fn run_adaptation<R: Rng + ?Sized>(
    config: &MetagradConfig,
    rng: &mut R,
    shots: usize,
    queries: usize,
    hidden: usize,
) -> Result<AdaptReport> {
    let inner = &config.inner_loop;
    if !inner.first_order {
        // must precede the first backward pass
        enable_second_order();
    }

    let device = resolve_device(&config.device)?;
    let model = MetaSequentialBuilder::new()
        .dense(FEATURE_DIM, hidden, true, Activation::Relu)
        .dense(hidden, SyntheticTask::NUM_CLASSES, true, Activation::Linear)
        .build(&device)?;

    let task = SyntheticTask::sample(rng, shots, queries);
    let ((support_x, support_y), (query_x, query_y)) =
        tensors_to_device(&task.to_tensors()?, &device)?;

    let initial = model.meta_named_parameters();
    let support_loss_before = support_loss(&model, &initial, &support_x, &support_y)?
        .to_scalar::<f32>()?;
    let query_accuracy_before = query_accuracy(&model, &initial, &query_x, &query_y)?;

    let step_size = StepSize::scalar(inner.step_size);
    let mut params = initial;
    for step in 0..inner.num_steps {
        let loss = support_loss(&model, &params, &support_x, &support_y)?;
        let value = loss.to_scalar::<f32>()?;
        debug!(step, loss = value, "inner step");
        params =
            gradient_update_parameters(&model, &loss, Some(&params), &step_size, inner.first_order)?;
    }

    let support_loss_after = support_loss(&model, &params, &support_x, &support_y)?
        .to_scalar::<f32>()?;
    let query_accuracy_after = query_accuracy(&model, &params, &query_x, &query_y)?;

    info!(
        support_loss_before,
        support_loss_after, query_accuracy_before, query_accuracy_after, "adaptation finished"
    );

    Ok(AdaptReport {
        device: format!("{:?}", device.location()),
        steps: inner.num_steps,
        step_size: inner.step_size,
        first_order: inner.first_order,
        support_loss_before,
        support_loss_after,
        query_accuracy_before,
        query_accuracy_after,
    })
}

fn support_loss(
    model: &MetaSequential,
    params: &MetaParams,
    features: &Tensor,
    labels: &Tensor,
) -> Result<Tensor> {
    let logits = model.forward_with(features, Some(params))?;
    Ok(candle_nn::loss::cross_entropy(&logits, labels)?)
}

fn query_accuracy(
    model: &MetaSequential,
    params: &MetaParams,
    features: &Tensor,
    labels: &Tensor,
) -> Result<f32> {
    let logits = model.forward_with(features, Some(params))?;
    Ok(compute_accuracy(&logits, labels)?)
}

/// Parse arguments, load configuration and run the selected command.
pub fn run() -> Result<()> {
    App::new()?.run()
}
