//! Inner-loop defaults.

/// Step size used by a gradient update when none is given.
pub const DEFAULT_STEP_SIZE: f64 = 0.5;

/// Number of inner-loop gradient steps.
pub const DEFAULT_NUM_STEPS: usize = 1;

/// Index of the accelerator picked when several are present.
pub const DEFAULT_DEVICE_INDEX: usize = 0;

/// Application directory name under the platform config dir.
pub const CONFIG_DIR_NAME: &str = "metagrad";

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable read by candle's backprop to keep gradient graphs.
pub const SECOND_ORDER_ENV: &str = "CANDLE_GRAD_DO_NOT_DETACH";
