//! Logging capability injected into the scheduler.
//!
//! The scheduler only reports failures: an error-level summary and a lazily
//! rendered debug-level detail. Implementations decide where those go.

use std::sync::Arc;

pub trait CycleLogger: Send + Sync {
    fn error(&self, message: &str);

    /// `detail` is only evaluated when debug output is wanted.
    fn debug(&self, detail: &dyn Fn() -> String);
}

/// A reference-counted reference to a [`CycleLogger`].
pub type CycleLoggerRef = Arc<dyn CycleLogger>;

/// Forwards to the `tracing` macros under the `metrics::scheduler` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl CycleLogger for TracingLogger {
    #[inline]
    fn error(&self, message: &str) {
        tracing::error!(target: "metrics::scheduler", "{}", message);
    }

    #[inline]
    fn debug(&self, detail: &dyn Fn() -> String) {
        if tracing::enabled!(target: "metrics::scheduler", tracing::Level::DEBUG) {
            tracing::debug!(target: "metrics::scheduler", "{}", detail());
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::CycleLogger;
    use parking_lot::Mutex;

    /// Captures log lines so tests can assert on reported failures.
    #[derive(Debug, Default)]
    pub struct RecordingLogger {
        errors: Mutex<Vec<String>>,
        debugs: Mutex<Vec<String>>,
    }

    impl RecordingLogger {
        pub fn errors(&self) -> Vec<String> {
            self.errors.lock().clone()
        }

        pub fn debugs(&self) -> Vec<String> {
            self.debugs.lock().clone()
        }
    }

    impl CycleLogger for RecordingLogger {
        fn error(&self, message: &str) {
            self.errors.lock().push(message.to_string());
        }

        fn debug(&self, detail: &dyn Fn() -> String) {
            self.debugs.lock().push(detail());
        }
    }
}
