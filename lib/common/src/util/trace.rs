use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Builds the log filter from `directives`, falling back to
/// [`DEFAULT_LOG_FILTER`] when they are absent or do not parse.
pub fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs the global subscriber: `RUST_LOG`-driven filtering and a fmt
/// layer on stderr, keeping stdout free for metric sets.
pub fn initialize_tracing() -> Result<()> {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    tracing_subscriber::registry()
        .with(log_filter(directives.as_deref()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_filter() {
        assert_eq!(log_filter(None).to_string(), DEFAULT_LOG_FILTER);
        assert_eq!(log_filter(Some("metrics=loud")).to_string(), DEFAULT_LOG_FILTER);
    }

    #[test]
    fn honours_explicit_directives() {
        assert_eq!(
            log_filter(Some("metrics::scheduler=debug")).to_string(),
            "metrics::scheduler=debug"
        );
    }
}
