use super::{Sampler, Samples, SystemRef};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use sysinfo::Pid;
use tracing::{instrument, trace};
use typed_builder::TypedBuilder;

pub const SYSTEM_CPU_TOTAL_NORM_PCT: &str = "system.cpu.total.norm.pct";
pub const PROCESS_CPU_TOTAL_NORM_PCT: &str = "system.process.cpu.total.norm.pct";

/// Reports system-wide and current-process CPU usage as fractions in `[0, 1]`,
/// normalized over all cores.
///
/// CPU usage is computed from the difference between two refreshes, so the
/// first call only primes the counters and reports nothing.
#[derive(Debug, TypedBuilder)]
pub struct CpuSampler {
    system: SystemRef,
    #[builder(default = sysinfo::get_current_pid().ok())]
    pid: Option<Pid>,
    #[builder(default)]
    primed: AtomicBool,
}

impl CpuSampler {
    pub fn new(system: SystemRef) -> Self {
        CpuSampler::builder().system(system).build()
    }
}

#[async_trait]
impl Sampler for CpuSampler {
    #[inline]
    fn name(&self) -> &str {
        "cpu"
    }

    #[instrument(skip(self))]
    async fn collect(&self) -> anyhow::Result<Option<Samples>> {
        let mut system = self.system.lock().await;

        system.refresh_cpu();
        if let Some(pid) = self.pid {
            system.refresh_process(pid);
        }

        if !self.primed.swap(true, Ordering::SeqCst) {
            trace!("Primed CPU counters, nothing to report yet");
            return Ok(None);
        }

        let cpu_count = system.cpus().len().max(1) as f64;
        let mut samples = Samples::new();
        samples.insert(
            SYSTEM_CPU_TOTAL_NORM_PCT.to_string(),
            f64::from(system.global_cpu_info().cpu_usage()) / 100.0,
        );

        if let Some(process) = self.pid.and_then(|pid| system.process(pid)) {
            samples.insert(
                PROCESS_CPU_TOTAL_NORM_PCT.to_string(),
                f64::from(process.cpu_usage()) / 100.0 / cpu_count,
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
    async fn first_collect_only_primes_counters() {
        let sampler = CpuSampler::new(Arc::new(Mutex::new(System::new())));

        let first = sampler.collect().await.unwrap();
        assert!(first.is_none());

        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return;
        }

        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        let second = sampler.collect().await.unwrap().unwrap();
        let total = second[SYSTEM_CPU_TOTAL_NORM_PCT];
        assert!((0.0..=1.0).contains(&total), "total = {}", total);
    }
}
