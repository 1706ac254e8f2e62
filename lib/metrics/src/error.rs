use std::time::Duration;
use thiserror::Error;

/// Misuse of the scheduler lifecycle, surfaced synchronously to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Metrics scheduler is already running")]
    AlreadyRunning,

    #[error("Interval and timeout must be non-zero (interval: {interval:?}, timeout: {timeout:?})")]
    InvalidInterval { interval: Duration, timeout: Duration },

    #[error("Metrics scheduler must be started from within a Tokio runtime")]
    NoRuntime,
}

/// Failure of a single collection cycle. Never escapes the cycle boundary;
/// it is logged and the cadence continues.
#[derive(Error, Debug)]
pub enum CollectionError {
    #[error("Sampler '{sampler}' failed: {source}")]
    Sampler {
        sampler: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Collection cycle exceeded the {0:?} timeout")]
    Timeout(Duration),

    #[error("Metric set delivery failed: {0}")]
    Delivery(#[source] anyhow::Error),

    #[error("Collection cycle panicked: {0}")]
    Panicked(String),
}
