use crate::sampler::Samples;
use common::util::time::now_as_micros;
use getset::{CopyGetters, Getters};
use serde::Serialize;
use std::fmt;

/// The immutable, possibly empty result of one collection cycle.
///
/// Holds the merged samples of every sampler together with the time the set
/// was captured, in microseconds since the UNIX epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Getters, CopyGetters)]
pub struct MetricSet {
    #[getset(get_copy = "pub")]
    timestamp: i64,
    #[getset(get = "pub")]
    samples: Samples,
}

impl MetricSet {
    pub fn new(samples: Samples) -> Self {
        Self::with_timestamp(samples, now_as_micros())
    }

    pub fn with_timestamp(samples: Samples, timestamp: i64) -> Self {
        Self { timestamp, samples }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.samples.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.samples.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl From<Samples> for MetricSet {
    fn from(samples: Samples) -> Self {
        MetricSet::new(samples)
    }
}

impl fmt::Display for MetricSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MetricSet(@{}: ", self.timestamp)?;
        let mut first = true;
        for (name, value) in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
            first = false;
        }
        write!(f, ")")
    }
}
