//! Periodic metrics collection.
//!
//! A [`Scheduler`] polls an [`Aggregator`] of [`Sampler`]s on a fixed cadence,
//! bounds every cycle with a watchdog and hands each non-empty [`MetricSet`]
//! to a callback. Failures inside a cycle are logged through the injected
//! [`CycleLogger`] and never reach the host.

pub mod aggregator;
pub mod error;
pub mod logger;
pub mod metric;
pub mod sampler;
pub mod scheduler;

pub use aggregator::{Aggregator, AggregatorRef};
pub use error::{CollectionError, SchedulerError};
pub use logger::{CycleLogger, CycleLoggerRef, TracingLogger};
pub use metric::MetricSet;
pub use sampler::{default_samplers, Sampler, SamplerRef, Samples};
pub use scheduler::{CycleState, MetricSetCallback, Scheduler, SchedulerStats};
