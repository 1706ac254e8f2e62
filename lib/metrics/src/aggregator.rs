use crate::error::CollectionError;
use crate::sampler::{Sampler, SamplerRef, Samples};
use core::fmt;
use std::sync::Arc;
use tracing::{instrument, trace};

/// A reference-counted reference to an [`Aggregator`].
pub type AggregatorRef = Arc<Aggregator>;

/// Polls every registered sampler once and merges their output.
///
/// Samplers run in registration order. When two samplers report the same
/// metric, the one registered later wins.
#[derive(Default)]
pub struct Aggregator {
    samplers: Vec<SamplerRef>,
}

impl fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregator")
            .field("samplers", &self.sampler_names())
            .finish()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self { samplers: vec![] }
    }

    pub fn with_samplers(samplers: impl IntoIterator<Item = SamplerRef>) -> Self {
        Self {
            samplers: samplers.into_iter().collect(),
        }
    }

    pub fn register(&mut self, sampler: impl Sampler + 'static) -> &mut Self {
        self.samplers.push(Arc::new(sampler));
        self
    }

    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }

    pub fn sampler_names(&self) -> Vec<&str> {
        self.samplers.iter().map(|s| s.name()).collect()
    }

    /// Runs each sampler once and merges the results.
    ///
    /// The first sampler error aborts the collection; samplers after it are
    /// not polled this cycle.
    #[instrument(skip(self), fields(samplers = self.samplers.len()))]
    pub async fn collect(&self) -> Result<Samples, CollectionError> {
        let mut merged = Samples::new();

        for sampler in &self.samplers {
            let sample = sampler
                .collect()
                .await
                .map_err(|source| CollectionError::Sampler {
                    sampler: sampler.name().to_string(),
                    source,
                })?;

            match sample {
                Some(sample) if !sample.is_empty() => {
                    trace!(sampler = sampler.name(), count = sample.len(), "Merging samples");
                    merged.extend(sample);
                }
                _ => trace!(sampler = sampler.name(), "Sampler reported nothing"),
            }
        }

        Ok(merged)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::sampler::{Sampler, Samples};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    pub fn samples(entries: &[(&str, f64)]) -> Samples {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    /// Sampler returning a fixed result, optionally after a delay.
    #[derive(Debug, Clone)]
    pub struct StaticSampler {
        pub name: &'static str,
        pub sample: Option<Samples>,
        pub delay: Option<Duration>,
        pub calls: Arc<AtomicUsize>,
    }

    impl StaticSampler {
        pub fn new(name: &'static str, sample: Option<Samples>) -> Self {
            Self {
                name,
                sample,
                delay: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Sampler for StaticSampler {
        fn name(&self) -> &str {
            self.name
        }

        async fn collect(&self) -> anyhow::Result<Option<Samples>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.sample.clone())
        }
    }

    /// Sampler that fails on the calls listed in `fail_on` (1-based) and
    /// reports `sample` otherwise.
    #[derive(Debug, Clone)]
    pub struct FlakySampler {
        pub fail_on: Vec<usize>,
        pub sample: Samples,
        pub calls: Arc<AtomicUsize>,
    }

    impl FlakySampler {
        pub fn new(fail_on: Vec<usize>, sample: Samples) -> Self {
            Self {
                fail_on,
                sample,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Sampler for FlakySampler {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn collect(&self) -> anyhow::Result<Option<Samples>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on.contains(&call) {
                return Err(anyhow!("counter read failed on call {}", call));
            }
            Ok(Some(self.sample.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{samples, FlakySampler, StaticSampler};
    use super::*;
    use pretty_assertions_sorted::assert_eq;

    #[tokio::test]
    async fn later_sampler_wins_on_duplicate_keys() {
        let mut aggregator = Aggregator::new();
        aggregator
            .register(StaticSampler::new("a", Some(samples(&[("cpu", 1.0)]))))
            .register(StaticSampler::new(
                "b",
                Some(samples(&[("cpu", 2.0), ("mem", 5.0)])),
            ));

        let merged = aggregator.collect().await.unwrap();

        assert_eq!(merged, samples(&[("cpu", 2.0), ("mem", 5.0)]));
    }

    #[tokio::test]
    async fn absent_and_empty_results_contribute_nothing() {
        let mut aggregator = Aggregator::new();
        aggregator
            .register(StaticSampler::new("absent", None))
            .register(StaticSampler::new("empty", Some(Samples::new())))
            .register(StaticSampler::new("disk", Some(samples(&[("disk", 3.0)]))));

        let merged = aggregator.collect().await.unwrap();

        assert_eq!(merged, samples(&[("disk", 3.0)]));
    }

    #[tokio::test]
    async fn no_samplers_yields_empty_mapping() {
        let aggregator = Aggregator::new();
        assert!(aggregator.is_empty());
        assert!(aggregator.collect().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sampler_error_names_the_sampler_and_stops_collection() {
        let after = StaticSampler::new("after", Some(samples(&[("x", 1.0)])));
        let mut aggregator = Aggregator::new();
        aggregator
            .register(FlakySampler::new(vec![1], samples(&[("cpu", 1.0)])))
            .register(after.clone());

        let err = aggregator.collect().await.unwrap_err();

        match err {
            CollectionError::Sampler { sampler, source } => {
                assert_eq!(sampler, "flaky");
                assert_eq!(source.to_string(), "counter read failed on call 1");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(after.calls(), 0);
    }

    #[test]
    fn keeps_registration_order() {
        let aggregator = Aggregator::with_samplers(vec![
            Arc::new(StaticSampler::new("b", None)) as SamplerRef,
            Arc::new(StaticSampler::new("a", None)) as SamplerRef,
        ]);
        assert_eq!(aggregator.len(), 2);
        assert_eq!(aggregator.sampler_names(), vec!["b", "a"]);
    }
}
