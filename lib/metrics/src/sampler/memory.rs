use super::{Sampler, Samples, SystemRef};
use async_trait::async_trait;
use sysinfo::Pid;
use tracing::instrument;
use typed_builder::TypedBuilder;

pub const SYSTEM_MEMORY_TOTAL: &str = "system.memory.total";
pub const SYSTEM_MEMORY_ACTUAL_FREE: &str = "system.memory.actual.free";
pub const PROCESS_MEMORY_SIZE: &str = "system.process.memory.size";
pub const PROCESS_MEMORY_RSS_BYTES: &str = "system.process.memory.rss.bytes";

/// Reports system memory and the current process' virtual and resident
/// memory, all in bytes.
#[derive(Debug, Clone, TypedBuilder)]
pub struct MemorySampler {
    system: SystemRef,
    #[builder(default = sysinfo::get_current_pid().ok())]
    pid: Option<Pid>,
}

impl MemorySampler {
    pub fn new(system: SystemRef) -> Self {
        MemorySampler::builder().system(system).build()
    }
}

#[async_trait]
impl Sampler for MemorySampler {
    #[inline]
    fn name(&self) -> &str {
        "memory"
    }

    #[instrument(skip(self))]
    async fn collect(&self) -> anyhow::Result<Option<Samples>> {
        let mut system = self.system.lock().await;

        system.refresh_memory();
        if let Some(pid) = self.pid {
            system.refresh_process(pid);
        }

        let total = system.total_memory();
        if total == 0 {
            // Counters unavailable on this host.
            return Ok(None);
        }

        let mut samples = Samples::new();
        samples.insert(SYSTEM_MEMORY_TOTAL.to_string(), total as f64);
        samples.insert(
            SYSTEM_MEMORY_ACTUAL_FREE.to_string(),
            system.available_memory() as f64,
        );

        if let Some(process) = self.pid.and_then(|pid| system.process(pid)) {
            samples.insert(
                PROCESS_MEMORY_SIZE.to_string(),
                process.virtual_memory() as f64,
            );
            samples.insert(
                PROCESS_MEMORY_RSS_BYTES.to_string(),
                process.memory() as f64,
            );
        }

        Ok(Some(samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use sysinfo::System;
    use tokio::sync::Mutex;

    #[tokio::test]
    async fn reports_system_and_process_memory() {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return;
        }

        let sampler = MemorySampler::new(Arc::new(Mutex::new(System::new())));
        let samples = sampler.collect().await.unwrap().unwrap();

        let total = samples[SYSTEM_MEMORY_TOTAL];
        assert!(total > 0.0);
        assert!(samples[SYSTEM_MEMORY_ACTUAL_FREE] <= total);
        if let Some(rss) = samples.get(PROCESS_MEMORY_RSS_BYTES) {
            assert!(*rss > 0.0);
        }
    }
}
