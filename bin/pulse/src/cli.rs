use anyhow::{anyhow, Result};
use clap::Parser;
use common::MetricsConfig;
use getset::CopyGetters;
use std::path::PathBuf;

/// pulse: periodic host metrics sampler
#[derive(Debug, Parser, CopyGetters)]
#[command(name = "pulse")]
#[command(about = "pulse: samples host metrics on a fixed cadence and prints them as JSON", long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file (`interval_ms`, `timeout_ms`)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Collection interval in milliseconds, 0 disables collection
    #[arg(short, long)]
    interval_ms: Option<u64>,
    /// Watchdog timeout for a single cycle, in milliseconds
    #[arg(short, long)]
    timeout_ms: Option<u64>,
    /// Pretty-print each metric set
    #[arg(short, long)]
    #[getset(get_copy = "pub")]
    pretty: bool,
}

impl Cli {
    /// Loads the configuration file and environment, then applies the
    /// command-line overrides.
    pub fn resolve_config(&self) -> Result<MetricsConfig> {
        let path = self
            .config
            .as_deref()
            .map(|path| {
                path.to_str()
                    .ok_or_else(|| anyhow!("Configuration path is not valid UTF-8: {:?}", path))
            })
            .transpose()?;

        let mut config = MetricsConfig::load_from_file_and_env(path)?;
        if let Some(interval_ms) = self.interval_ms {
            config.set_interval_ms(interval_ms);
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.set_timeout_ms(timeout_ms);
        }
        config.validate()?;

        Ok(config)
    }
}
