mod cli;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use common::platform;
use common::util::trace::initialize_tracing;
use metrics::{default_samplers, Aggregator, Scheduler};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    initialize_tracing()?;

    let args = Cli::parse();
    info!("pulse started");

    let config = args.resolve_config()?;
    if !config.is_enabled() {
        info!("Metrics collection disabled (interval is 0), exiting");
        return Ok(());
    }

    let samplers = default_samplers();
    if samplers.is_empty() {
        warn!(platform = %platform(), "No samplers available on this platform");
    }

    let scheduler = Scheduler::new(Aggregator::with_samplers(samplers));
    let pretty = args.pretty();
    scheduler.start(config.interval(), config.timeout(), move |set| {
        let json = if pretty {
            set.to_json_pretty()?
        } else {
            set.to_json()?
        };
        println!("{}", json);
        Ok(())
    })?;

    signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping scheduler...");
    scheduler.stop().await;

    Ok(())
}
