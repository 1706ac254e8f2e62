//! Configuration parameters for the metrics scheduler.

use config::{ConfigBuilder, Environment, File, FileFormat};
use getset::{CopyGetters, Setters};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use typed_builder::TypedBuilder;

/// Time between the start of two consecutive collection cycles (30 seconds).
pub const DEFAULT_INTERVAL_MS: u64 = 30_000;

/// Upper bound on how long a single collection cycle may run before the
/// watchdog abandons it (5 seconds).
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Prefix of the environment variables that override file settings,
/// e.g. `PULSE__INTERVAL_MS=10000`.
pub const ENV_PREFIX: &str = "PULSE";

#[derive(Debug, Error)]
pub enum MetricsConfigError {
    #[error("Invalid configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Watchdog timeout must be greater than zero")]
    ZeroTimeout,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    CopyGetters,
    Setters,
    TypedBuilder,
)]
#[getset(get_copy = "pub", set = "pub")]
pub struct MetricsConfig {
    /// Cadence in milliseconds. Zero disables metrics collection.
    #[builder(default = DEFAULT_INTERVAL_MS)]
    interval_ms: u64,
    /// Watchdog bound for a single cycle, in milliseconds.
    #[builder(default = DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig::builder().build()
    }
}

impl MetricsConfig {
    /// Load configuration from an optional TOML file, then the environment.
    ///
    /// Values missing from both sources fall back to [`DEFAULT_INTERVAL_MS`]
    /// and [`DEFAULT_TIMEOUT_MS`]. Environment variables take precedence
    /// over the file.
    pub fn load_from_file_and_env(file_path: Option<&str>) -> Result<Self, MetricsConfigError> {
        let mut builder = ConfigBuilder::<config::builder::DefaultState>::default()
            .set_default("interval_ms", DEFAULT_INTERVAL_MS as i64)?
            .set_default("timeout_ms", DEFAULT_TIMEOUT_MS as i64)?;

        if let Some(file_path) = file_path {
            debug!(file_path, "Loading metrics configuration file");
            builder = builder.add_source(File::new(file_path, FileFormat::Toml).required(false));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<MetricsConfig>()?;

        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the scheduler relies on.
    pub fn validate(&self) -> Result<(), MetricsConfigError> {
        if self.timeout_ms == 0 {
            return Err(MetricsConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Whether periodic collection should run at all.
    pub fn is_enabled(&self) -> bool {
        self.interval_ms > 0
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
