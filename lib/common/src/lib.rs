//! Shared plumbing for the pulse workspace: configuration, platform
//! detection and tracing/time helpers.

pub mod config;
pub mod platform;
pub mod util;

pub use config::{MetricsConfig, MetricsConfigError};
pub use platform::{platform, Platform};
