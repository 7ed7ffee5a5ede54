use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_DEVICE_INDEX, DEFAULT_NUM_STEPS, DEFAULT_STEP_SIZE,
};
use crate::error::IntoCoreError;
use crate::Error;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Main configuration for metagrad.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MetagradConfig {
    /// Inner-loop adaptation settings.
    pub inner_loop: InnerLoopConfig,

    /// Compute device selection.
    pub device: DeviceConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Inner-loop (task adaptation) configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct InnerLoopConfig {
    /// Step size of each gradient update.
    pub step_size: f64,

    /// Treat gradients as constants (first-order approximation).
    pub first_order: bool,

    /// Number of gradient steps per task.
    pub num_steps: usize,
}

/// Compute device configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceConfig {
    /// Backend to place tensors on.
    pub kind: DeviceKind,

    /// Ordinal of the accelerator.
    pub index: usize,
}

/// Compute backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Pick the best available accelerator, falling back to CPU.
    Auto,

    /// CPU.
    Cpu,

    /// CUDA acceleration.
    Cuda,

    /// Metal acceleration (macOS).
    Metal,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    /// Log level.
    pub level: LogLevel,
}

/// Log level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error level.
    Error,

    /// Warning level.
    Warn,

    /// Info level.
    Info,

    /// Debug level.
    Debug,

    /// Trace level.
    Trace,
}

impl MetagradConfig {
    /// Default location of the configuration file.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Cannot find config directory".to_string()))?;
        Ok(config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::FileSystem(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content).with_context("Failed to parse config")?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path, content)
            .map_err(|e| Error::FileSystem(format!("Failed to write config file: {}", e)))
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).with_context("Failed to serialize config")
    }

    /// Check that the values can drive an inner loop.
    pub fn validate(&self) -> Result<()> {
        self.inner_loop.validate()
    }
}

impl InnerLoopConfig {
    /// Check step size and step count.
    pub fn validate(&self) -> Result<()> {
        if !self.step_size.is_finite() || self.step_size <= 0.0 {
            return Err(Error::validation(format!(
                "step size must be a positive finite number, got {}",
                self.step_size
            )));
        }
        if self.num_steps == 0 {
            return Err(Error::validation("number of inner steps must be at least 1"));
        }
        Ok(())
    }
}

impl Default for InnerLoopConfig {
    fn default() -> Self {
        Self {
            step_size: DEFAULT_STEP_SIZE,
            first_order: false,
            num_steps: DEFAULT_NUM_STEPS,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            kind: DeviceKind::Auto,
            index: DEFAULT_DEVICE_INDEX,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceKind::Auto => "auto",
            DeviceKind::Cpu => "cpu",
            DeviceKind::Cuda => "cuda",
            DeviceKind::Metal => "metal",
        };
        f.write_str(name)
    }
}

impl FromStr for DeviceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(DeviceKind::Auto),
            "cpu" => Ok(DeviceKind::Cpu),
            "cuda" | "gpu" => Ok(DeviceKind::Cuda),
            "metal" | "mps" => Ok(DeviceKind::Metal),
            other => Err(Error::config(format!("unknown device kind '{}'", other))),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_inner_loop_defaults() {
        let config = MetagradConfig::default();
        assert_eq!(config.inner_loop.step_size, 0.5);
        assert!(!config.inner_loop.first_order);
        assert_eq!(config.inner_loop.num_steps, 1);
        assert_eq!(config.device.kind, DeviceKind::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_survives_toml_round_trip() {
        let mut config = MetagradConfig::default();
        config.inner_loop.step_size = 0.05;
        config.inner_loop.first_order = true;
        config.inner_loop.num_steps = 5;
        config.device.kind = DeviceKind::Cpu;

        let text = config.to_toml().expect("config should serialize");
        assert!(text.contains("stepSize"));
        assert!(text.contains("firstOrder"));

        let parsed: MetagradConfig = toml::from_str(&text).expect("config should parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let parsed: MetagradConfig = toml::from_str(
            r#"
            [innerLoop]
            stepSize = 0.1
            "#,
        )
        .expect("partial config should parse");
        assert_eq!(parsed.inner_loop.step_size, 0.1);
        assert_eq!(parsed.inner_loop.num_steps, 1);
        assert_eq!(parsed.device, DeviceConfig::default());
    }

    #[test]
    fn validate_rejects_non_positive_step_size() {
        let mut config = MetagradConfig::default();
        config.inner_loop.step_size = 0.0;
        let err = config.validate().expect_err("zero step size must be rejected");
        assert!(err.to_string().contains("step size"));

        config.inner_loop.step_size = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_steps() {
        let mut config = MetagradConfig::default();
        config.inner_loop.num_steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_and_load_through_file() {
        let path = std::env::temp_dir().join(format!(
            "metagrad-config-{}/config.toml",
            std::process::id()
        ));
        let mut config = MetagradConfig::default();
        config.inner_loop.num_steps = 3;
        config.save(&path).expect("config should save");

        let loaded = MetagradConfig::load(&path).expect("config should load");
        assert_eq!(loaded, config);

        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn device_kind_parses_aliases() {
        assert_eq!("CPU".parse::<DeviceKind>().unwrap(), DeviceKind::Cpu);
        assert_eq!("mps".parse::<DeviceKind>().unwrap(), DeviceKind::Metal);
        assert_eq!("gpu".parse::<DeviceKind>().unwrap(), DeviceKind::Cuda);
        assert!("tpu".parse::<DeviceKind>().is_err());
    }
}
