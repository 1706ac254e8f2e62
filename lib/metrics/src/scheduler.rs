//! Periodic collection scheduler.
//!
//! A single worker task drives the cadence. Every tick spawns one cycle body
//! (collect, build a [`MetricSet`], deliver it when non-empty) and supervises
//! it with a watchdog. At most one cycle body is active at a time: a tick that
//! comes due while a body is still executing is skipped.
//!
//! A cycle that outlives its timeout is abandoned and can never reach the
//! callback. On a multi-threaded runtime the body runs under
//! [`block_in_place`], so a sampler that blocks its thread does not hold up
//! the watchdog. Aborting such a body only takes effect once it returns;
//! ticks keep being skipped until then. Independently, the body checks its
//! own deadline before delivering, so a late body stays silent even when the
//! watchdog could not run.

use crate::aggregator::{Aggregator, AggregatorRef};
use crate::error::{CollectionError, SchedulerError};
use crate::logger::{CycleLoggerRef, TracingLogger};
use crate::metric::MetricSet;
use common::util::time::format_duration;
use serde::Serialize;
use std::any::Any;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::Mutex;
use tokio::task::{block_in_place, JoinError, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace};
use typed_builder::TypedBuilder;

/// Receives every non-empty [`MetricSet`], at most once per cycle and never
/// concurrently. An error marks the cycle as failed.
pub type MetricSetCallback = Arc<dyn Fn(MetricSet) -> anyhow::Result<()> + Send + Sync>;

/// Lifecycle of a single collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum CycleState {
    /// Spawned, body not polled yet.
    Pending = 0,
    Running = 1,
    /// The metric set is being handed to the callback.
    Delivering = 2,
    Completed = 3,
    Failed = 4,
    TimedOut = 5,
    /// The tick came due while another cycle body was still active.
    Skipped = 6,
}

impl CycleState {
    fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(CycleState::Pending),
            1 => Some(CycleState::Running),
            2 => Some(CycleState::Delivering),
            3 => Some(CycleState::Completed),
            4 => Some(CycleState::Failed),
            5 => Some(CycleState::TimedOut),
            6 => Some(CycleState::Skipped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CycleState::Completed | CycleState::Failed | CycleState::TimedOut | CycleState::Skipped
        )
    }
}

/// Snapshot of the scheduler's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub cycles_started: u64,
    pub cycles_completed: u64,
    pub cycles_delivered: u64,
    pub cycles_failed: u64,
    pub cycles_timed_out: u64,
    pub ticks_skipped: u64,
    pub last_state: Option<CycleState>,
}

const NO_STATE: u8 = u8::MAX;

#[derive(Debug)]
struct Counters {
    started: AtomicU64,
    completed: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    skipped: AtomicU64,
    last_state: AtomicU8,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            started: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            last_state: AtomicU8::new(NO_STATE),
        }
    }
}

impl Counters {
    fn finish(&self, state: CycleState) {
        let counter = match state {
            CycleState::Completed => &self.completed,
            CycleState::Failed => &self.failed,
            CycleState::TimedOut => &self.timed_out,
            CycleState::Skipped => &self.skipped,
            CycleState::Pending | CycleState::Running | CycleState::Delivering => return,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        self.last_state.store(state as u8, Ordering::SeqCst);
    }

    fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            cycles_started: self.started.load(Ordering::SeqCst),
            cycles_completed: self.completed.load(Ordering::SeqCst),
            cycles_delivered: self.delivered.load(Ordering::SeqCst),
            cycles_failed: self.failed.load(Ordering::SeqCst),
            cycles_timed_out: self.timed_out.load(Ordering::SeqCst),
            ticks_skipped: self.skipped.load(Ordering::SeqCst),
            last_state: CycleState::from_u8(self.last_state.load(Ordering::SeqCst)),
        }
    }
}

#[derive(Debug)]
struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Runs the aggregator on a fixed cadence and hands each non-empty result
/// to a callback.
///
/// # Examples
///
/// ```no_run
/// use metrics::{Aggregator, Scheduler};
/// use std::time::Duration;
///
/// # async fn run() -> anyhow::Result<()> {
/// let scheduler = Scheduler::builder().aggregator(Aggregator::new()).build();
/// scheduler.start(Duration::from_secs(30), Duration::from_secs(5), |set| {
///     println!("{}", set);
///     Ok(())
/// })?;
/// // ...
/// scheduler.stop().await;
/// # Ok(())
/// # }
/// ```
#[derive(TypedBuilder)]
pub struct Scheduler {
    #[builder(setter(into))]
    aggregator: AggregatorRef,
    #[builder(default = Arc::new(TracingLogger) as CycleLoggerRef)]
    logger: CycleLoggerRef,
    #[builder(default, setter(skip))]
    counters: Arc<Counters>,
    #[builder(default, setter(skip))]
    worker: Mutex<Option<Worker>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("aggregator", &self.aggregator)
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Scheduler {
    /// Creates a scheduler logging through `tracing`.
    pub fn new(aggregator: Aggregator) -> Self {
        Scheduler::builder().aggregator(aggregator).build()
    }

    /// Starts the cadence. The first cycle fires immediately, the following
    /// ones every `interval`, measured from cycle start to cycle start.
    ///
    /// Must be called from within a Tokio runtime. Fails without changing
    /// state if the scheduler is already running (or still stopping).
    pub fn start<F>(
        &self,
        interval: Duration,
        timeout: Duration,
        callback: F,
    ) -> Result<(), SchedulerError>
    where
        F: Fn(MetricSet) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let Ok(mut worker) = self.worker.try_lock() else {
            return Err(SchedulerError::AlreadyRunning);
        };
        if worker.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }
        if interval.is_zero() || timeout.is_zero() {
            return Err(SchedulerError::InvalidInterval { interval, timeout });
        }
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        let cancel = CancellationToken::new();
        let runner = CycleRunner {
            aggregator: self.aggregator.clone(),
            logger: self.logger.clone(),
            counters: self.counters.clone(),
            callback: Arc::new(callback),
            timeout,
        };
        let handle = runtime.spawn(drive(interval, runner, cancel.clone()));

        info!(
            interval = %format_duration(interval),
            timeout = %format_duration(timeout),
            samplers = self.aggregator.len(),
            "Started metrics scheduler"
        );

        *worker = Some(Worker { cancel, handle });
        Ok(())
    }

    /// Stops the cadence and waits for the in-flight cycle, if any, to reach
    /// a terminal state. No callback fires after this returns.
    ///
    /// Calling it on a stopped scheduler does nothing.
    pub async fn stop(&self) {
        let mut worker = self.worker.lock().await;
        let Some(Worker { cancel, handle }) = worker.take() else {
            trace!("Metrics scheduler not running, nothing to stop");
            return;
        };

        cancel.cancel();
        if let Err(e) = handle.await {
            error!(error = %e, "Metrics scheduler worker ended abnormally");
        }

        info!(stats = ?self.counters.snapshot(), "Stopped metrics scheduler");
    }

    /// Whether a worker is driving the cadence. A scheduler that is in the
    /// middle of stopping still counts as running.
    pub fn is_running(&self) -> bool {
        self.worker
            .try_lock()
            .map(|worker| worker.is_some())
            .unwrap_or(true)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.counters.snapshot()
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            debug!("Metrics scheduler dropped while running, cancelling worker");
            worker.cancel.cancel();
        }
    }
}

/// Worker loop: one tick, at most one cycle.
async fn drive(interval: Duration, runner: CycleRunner, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut busy_until: Option<Instant> = None;
    let mut abandoned: Option<CycleTask> = None;
    let mut seq: u64 = 0;

    loop {
        let deadline = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            deadline = ticker.tick() => deadline,
        };

        if let Some(end) = busy_until.filter(|end| deadline < *end) {
            // Missed ticks between `deadline` and `end` are collapsed into
            // this one by the ticker.
            let missed = ((end - deadline).as_nanos() / interval.as_nanos()) as u64 + 1;
            debug!(missed, "Previous cycle overran the cadence, skipping tick");
            for _ in 0..missed {
                runner.counters.finish(CycleState::Skipped);
            }
            busy_until = None;
            continue;
        }

        if abandoned.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("Abandoned cycle still executing, skipping tick");
            runner.counters.finish(CycleState::Skipped);
            continue;
        }

        seq += 1;
        abandoned = runner.run(seq).await;
        busy_until = Some(Instant::now());
    }

    if let Some(task) = abandoned {
        task.abort();
    }
    trace!("Metrics scheduler worker loop ended");
}

/// How a cycle body that ran to completion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOutcome {
    /// Nothing was collected, so nothing was delivered.
    Empty,
    Delivered,
    /// The body passed its deadline and gave up without delivering.
    Overran,
}

type CycleTask = JoinHandle<Result<CycleOutcome, CollectionError>>;

struct CycleRunner {
    aggregator: AggregatorRef,
    logger: CycleLoggerRef,
    counters: Arc<Counters>,
    callback: MetricSetCallback,
    timeout: Duration,
}

impl CycleRunner {
    /// Runs one supervised cycle. Returns the cycle task when the watchdog
    /// gave up on it while it may still be alive.
    #[instrument(name = "cycle", skip(self))]
    async fn run(&self, seq: u64) -> Option<CycleTask> {
        self.counters.started.fetch_add(1, Ordering::SeqCst);

        let deadline = Instant::now() + self.timeout;
        let state = Arc::new(AtomicU8::new(CycleState::Pending as u8));
        let mut task = spawn_cycle(cycle_body(
            self.aggregator.clone(),
            self.callback.clone(),
            state.clone(),
            deadline,
        ));

        let joined = match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(joined) => joined,
            Err(_elapsed) => {
                self.report(&CollectionError::Timeout(self.timeout));
                if claim_timeout(&state) {
                    self.counters.finish(CycleState::TimedOut);
                    task.abort();
                    return Some(task);
                }

                // Delivery already began and cannot be recalled; let the
                // callback finish so it never overlaps the next cycle.
                debug!("Cycle timed out while delivering, awaiting callback");
                self.settle(task.await, true);
                return None;
            }
        };

        self.settle(joined, false);
        None
    }

    /// Records the terminal state of a body that ran to completion. `late`
    /// marks a delivery that finished after the watchdog fired.
    fn settle(&self, joined: Result<Result<CycleOutcome, CollectionError>, JoinError>, late: bool) {
        let outcome = joined
            .map_err(|join_error| CollectionError::Panicked(describe_join_error(join_error)))
            .and_then(|outcome| outcome);

        match outcome {
            Ok(CycleOutcome::Overran) => {
                self.report(&CollectionError::Timeout(self.timeout));
                self.counters.finish(CycleState::TimedOut);
            }
            Ok(outcome) => {
                let delivered = outcome == CycleOutcome::Delivered;
                if delivered {
                    self.counters.delivered.fetch_add(1, Ordering::SeqCst);
                }
                trace!(delivered, late, "Collection cycle completed");
                self.counters.finish(if late {
                    CycleState::TimedOut
                } else {
                    CycleState::Completed
                });
            }
            Err(e) => {
                self.report(&e);
                self.counters.finish(CycleState::Failed);
            }
        }
    }

    fn report(&self, error: &CollectionError) {
        self.logger
            .error(&format!("Error while collecting metrics: {}", error));
        self.logger.debug(&|| format!("{:?}", error));
    }
}

/// Spawns a cycle body. On a multi-threaded runtime the body gives up its
/// worker while it runs, so blocking sampler or callback code cannot stall
/// the timers the watchdog relies on.
fn spawn_cycle<F>(body: F) -> CycleTask
where
    F: std::future::Future<Output = Result<CycleOutcome, CollectionError>> + Send + 'static,
{
    let handle = Handle::current();
    match handle.runtime_flavor() {
        RuntimeFlavor::MultiThread => {
            tokio::spawn(async move { block_in_place(move || handle.block_on(body)) })
        }
        _ => tokio::spawn(body),
    }
}

fn transition(state: &AtomicU8, from: CycleState, to: CycleState) -> bool {
    state
        .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

/// Hands the cycle to the watchdog unless delivery already started.
fn claim_timeout(state: &AtomicU8) -> bool {
    let claimed = state.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |raw| {
        match CycleState::from_u8(raw) {
            Some(CycleState::Pending | CycleState::Running) => Some(CycleState::TimedOut as u8),
            _ => None,
        }
    });
    match claimed {
        Ok(_) => true,
        // The body may have noticed its own overrun first.
        Err(raw) => raw != CycleState::Delivering as u8,
    }
}

/// Collects, builds the metric set and delivers it if non-empty, unless the
/// deadline passed first.
async fn cycle_body(
    aggregator: AggregatorRef,
    callback: MetricSetCallback,
    state: Arc<AtomicU8>,
    deadline: Instant,
) -> Result<CycleOutcome, CollectionError> {
    if !transition(&state, CycleState::Pending, CycleState::Running) {
        return Ok(CycleOutcome::Overran);
    }

    let samples = aggregator.collect().await?;

    if Instant::now() >= deadline {
        transition(&state, CycleState::Running, CycleState::TimedOut);
        return Ok(CycleOutcome::Overran);
    }

    let metric_set = MetricSet::new(samples);
    if metric_set.is_empty() {
        trace!("No samples this cycle, nothing to deliver");
        return Ok(CycleOutcome::Empty);
    }

    // Loses the race only against the watchdog, which then owns the cycle.
    if !transition(&state, CycleState::Running, CycleState::Delivering) {
        return Ok(CycleOutcome::Overran);
    }

    trace!(metrics = metric_set.len(), "Delivering metric set");
    callback(metric_set).map_err(CollectionError::Delivery)?;
    Ok(CycleOutcome::Delivered)
}

fn describe_join_error(error: JoinError) -> String {
    if error.is_cancelled() {
        return "cycle task was cancelled".to_string();
    }
    panic_message(error.into_panic())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
