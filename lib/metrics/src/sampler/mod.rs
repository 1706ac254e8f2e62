use async_trait::async_trait;
use common::platform;
use std::collections::BTreeMap;
use std::sync::Arc;
use sysinfo::System;
use tokio::sync::Mutex;
use tracing::debug;

pub mod cpu;
pub mod memory;

/// Named metric values reported by a sampler, keyed by metric name.
pub type Samples = BTreeMap<String, f64>;

/// A source of metric samples, polled once per collection cycle.
///
/// Returning `Ok(None)` (or an empty map) means the sampler has nothing to
/// report this cycle. Implementations should not block indefinitely: the
/// scheduler treats a hang as a timeout.
#[async_trait]
pub trait Sampler: Send + Sync {
    /// Name used in logs and error reports.
    fn name(&self) -> &str;

    async fn collect(&self) -> anyhow::Result<Option<Samples>>;
}

/// A reference-counted reference to a [`Sampler`].
pub type SamplerRef = Arc<dyn Sampler>;

/// A shared, lockable [`System`] handle. Refreshing `sysinfo` counters
/// needs exclusive access, so samplers hold it behind an async mutex.
pub type SystemRef = Arc<Mutex<System>>;

/// The samplers registered by default on the detected platform.
///
/// Returns an empty list where `sysinfo` cannot read system counters.
pub fn default_samplers() -> Vec<SamplerRef> {
    let platform = platform();
    if !platform.supports_system_sampling() || !sysinfo::IS_SUPPORTED_SYSTEM {
        debug!(%platform, "System sampling unsupported, no default samplers");
        return vec![];
    }

    let system: SystemRef = Arc::new(Mutex::new(System::new()));
    vec![
        Arc::new(cpu::CpuSampler::new(system.clone())),
        Arc::new(memory::MemorySampler::new(system)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_samplers_follow_platform_support() {
        let samplers = default_samplers();
        if platform().supports_system_sampling() && sysinfo::IS_SUPPORTED_SYSTEM {
            let names = samplers.iter().map(|s| s.name()).collect::<Vec<_>>();
            assert_eq!(names, vec!["cpu", "memory"]);
        } else {
            assert!(samplers.is_empty());
        }
    }
}
