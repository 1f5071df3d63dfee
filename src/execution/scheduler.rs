//! Execution scheduler.
//!
//! Drives every executor on its own interval. A single tick loop decides
//! which executors are due and pushes a job onto each one's queue; one
//! dedicated worker thread per executor consumes that queue, so a slow
//! collection never delays another one.
//!
//! # Lifecycle
//!
//! `Created → Running → Stopping → Stopped`. [`ExecutionScheduler::run`]
//! blocks the calling thread until [`ExecutionScheduler::stop`] is called
//! from another thread (typically a signal handler).

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

use crate::config::AppConfig;
use crate::execution::executor::Executor;
use crate::execution::queue::{Job, JobQueue};

// =============================================================================
// Constants
// =============================================================================

/// Default interval between due checks.
pub const DEFAULT_TICK_RESOLUTION: Duration = Duration::from_secs(1);

// =============================================================================
// Types
// =============================================================================

/// Errors returned by [`ExecutionScheduler::run`].
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `run` was called while another `run` is active.
    #[error("scheduler is already running")]
    AlreadyRunning,

    /// `run` was called after `stop`.
    #[error("scheduler has been stopped")]
    AlreadyStopped,

    /// An executor worker thread could not be spawned.
    #[error("failed to spawn executor worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SchedulerState {
    /// Tick jobs registered, no worker started.
    Created,
    /// Tick loop and workers active.
    Running,
    /// Shutdown requested, teardown in progress.
    Stopping,
    /// Every executor has been shut down.
    Stopped,
}

/// Counters for one executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutorStats {
    pub collection: String,
    /// Effective tick interval.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Completed collection cycles.
    pub executed: u64,
    /// Ticks skipped because a cycle was already pending.
    pub dropped: u64,
    /// Jobs currently waiting in the queue.
    pub pending: usize,
}

struct Lane {
    executor: Arc<Executor>,
    interval: Duration,
    queue: JobQueue,
}

#[derive(Debug, Clone, Copy)]
struct Tick {
    lane: usize,
    interval: Duration,
    next_due: Instant,
}

// =============================================================================
// Scheduler
// =============================================================================

/// Periodically triggers executors on dedicated worker threads.
pub struct ExecutionScheduler {
    lanes: Vec<Lane>,
    resolution: Duration,
    ticks: Mutex<Vec<Tick>>,
    state: Mutex<SchedulerState>,
    state_changed: Condvar,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
}

impl ExecutionScheduler {
    /// Create a scheduler for `executors`.
    ///
    /// Executors without their own tick interval use `config.tick_time`.
    pub fn new(config: &AppConfig, executors: Vec<Executor>) -> Self {
        Self::with_tick_time(config.tick_time, executors)
    }

    /// Create a scheduler with an explicit default tick interval.
    pub fn with_tick_time(default_tick: Duration, executors: Vec<Executor>) -> Self {
        let default_tick = if default_tick.is_zero() {
            tracing::warn!("Default tick time is zero, using 1s");
            Duration::from_secs(1)
        } else {
            default_tick
        };

        let lanes = executors
            .into_iter()
            .map(|executor| Lane {
                interval: executor.tick_time().unwrap_or(default_tick),
                executor: Arc::new(executor),
                queue: JobQueue::new(),
            })
            .collect();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);

        Self {
            lanes,
            resolution: DEFAULT_TICK_RESOLUTION,
            ticks: Mutex::new(Vec::new()),
            state: Mutex::new(SchedulerState::Created),
            state_changed: Condvar::new(),
            stop_tx,
            stop_rx,
        }
    }

    /// Override how often the tick loop checks for due executors.
    pub fn tick_resolution(mut self, resolution: Duration) -> Self {
        self.resolution = resolution.max(Duration::from_millis(1));
        self
    }

    /// Register one tick job per executor.
    ///
    /// Idempotent; `run` calls it if needed.
    pub fn create(&self) {
        let mut ticks = lock(&self.ticks);
        if !ticks.is_empty() || self.lanes.is_empty() {
            return;
        }
        let now = Instant::now();
        for (index, lane) in self.lanes.iter().enumerate() {
            tracing::info!(
                collection = %lane.executor.collection(),
                interval = %humantime::format_duration(lane.interval),
                "Registered executor"
            );
            ticks.push(Tick {
                lane: index,
                interval: lane.interval,
                next_due: now,
            });
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        *lock(&self.state)
    }

    /// Number of managed executors.
    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    /// Whether there are no executors.
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Per-executor counters.
    pub fn stats(&self) -> Vec<ExecutorStats> {
        self.lanes
            .iter()
            .map(|lane| ExecutorStats {
                collection: lane.executor.collection().to_string(),
                interval: lane.interval,
                executed: lane.queue.executed(),
                dropped: lane.queue.dropped(),
                pending: lane.queue.pending(),
            })
            .collect()
    }

    /// Start the workers and run the tick loop until [`stop`](Self::stop).
    ///
    /// Every executor is triggered once immediately, then on its interval.
    ///
    /// # Errors
    /// - `AlreadyRunning` if another thread is inside `run`
    /// - `AlreadyStopped` if the scheduler has been stopped
    /// - `Spawn` if a worker thread cannot be started (the scheduler is then
    ///   torn down and ends `Stopped`)
    pub fn run(&self) -> Result<(), SchedulerError> {
        {
            let mut state = lock(&self.state);
            match *state {
                SchedulerState::Created => *state = SchedulerState::Running,
                SchedulerState::Running => return Err(SchedulerError::AlreadyRunning),
                SchedulerState::Stopping | SchedulerState::Stopped => {
                    return Err(SchedulerError::AlreadyStopped);
                }
            }
            self.state_changed.notify_all();
        }
        self.create();

        let mut workers = Vec::with_capacity(self.lanes.len());
        for lane in &self.lanes {
            let executor = Arc::clone(&lane.executor);
            let queue = lane.queue.clone();
            let spawned = thread::Builder::new()
                .name(format!("executor-{}", lane.executor.collection()))
                .spawn(move || work(&executor, &queue));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to start executor worker");
                    self.teardown(workers);
                    return Err(SchedulerError::Spawn(e));
                }
            }
        }
        tracing::info!(executors = self.lanes.len(), "Scheduler started");

        let mut ticks = lock(&self.ticks).clone();
        loop {
            let now = Instant::now();
            for tick in ticks.iter_mut() {
                if now >= tick.next_due {
                    let lane = &self.lanes[tick.lane];
                    if !lane.queue.schedule() {
                        tracing::warn!(
                            collection = %lane.executor.collection(),
                            "Executor still busy, dropping tick"
                        );
                    }
                    tick.next_due = now + tick.interval;
                }
            }

            match self.stop_rx.recv_timeout(self.resolution) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }

        self.teardown(workers);
        Ok(())
    }

    /// Request shutdown and block until every executor is shut down.
    ///
    /// Safe to call from any thread and more than once. Before `run` it
    /// shuts the executors down directly.
    pub fn stop(&self) {
        let mut state = lock(&self.state);
        let current = *state;
        match current {
            SchedulerState::Created => {
                *state = SchedulerState::Stopping;
                drop(state);
                tracing::info!("Stopping scheduler before start");
                for lane in &self.lanes {
                    lane.executor.shutdown();
                }
                self.set_state(SchedulerState::Stopped);
                return;
            }
            SchedulerState::Running => {
                tracing::info!("Stopping scheduler");
                *state = SchedulerState::Stopping;
                let _ = self.stop_tx.try_send(());
            }
            SchedulerState::Stopping | SchedulerState::Stopped => {}
        }

        let _stopped = self
            .state_changed
            .wait_while(state, |s| *s != SchedulerState::Stopped)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Block until the scheduler reaches `Stopped` or `timeout` elapses.
    ///
    /// Returns `true` if it stopped.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        let state = lock(&self.state);
        let (state, _) = self
            .state_changed
            .wait_timeout_while(state, timeout, |s| *s != SchedulerState::Stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *state == SchedulerState::Stopped
    }

    fn teardown(&self, workers: Vec<JoinHandle<()>>) {
        self.set_state(SchedulerState::Stopping);

        for lane in &self.lanes {
            lane.queue.stop();
        }
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!("Executor worker panicked");
            }
        }
        for lane in &self.lanes {
            lane.executor.shutdown();
        }

        self.set_state(SchedulerState::Stopped);
        tracing::info!("Scheduler stopped");
    }

    fn set_state(&self, next: SchedulerState) {
        *lock(&self.state) = next;
        self.state_changed.notify_all();
    }
}

impl std::fmt::Debug for ExecutionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionScheduler")
            .field("executors", &self.lanes.len())
            .field("resolution", &self.resolution)
            .field("state", &self.state())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Executor worker loop.
fn work(executor: &Executor, queue: &JobQueue) {
    tracing::debug!(collection = %executor.collection(), "Executor worker started");

    while let Ok(job) = queue.receiver().recv() {
        match job {
            Job::Execute if queue.is_halted() => {}
            Job::Execute => {
                executor.execute();
                queue.record_executed();
            }
            Job::Stop => break,
        }
    }

    tracing::debug!(collection = %executor.collection(), "Executor worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::dummy::{DummyConfig, DummySource};
    use crate::writer::memory::InMemoryWriter;

    fn executor(collection: &str, tick: Duration, writer: Arc<InMemoryWriter>) -> Executor {
        Executor::builder(collection)
            .tick_time(tick)
            .threads(1)
            .source(DummySource::new(None, DummyConfig::default()))
            .shared_writer(writer)
            .build()
            .unwrap()
    }

    #[test]
    fn test_stop_before_run() {
        let writer = Arc::new(InMemoryWriter::new(false));
        let scheduler =
            ExecutionScheduler::with_tick_time(Duration::from_secs(1), vec![executor("a", Duration::ZERO, writer)]);
        scheduler.create();
        assert_eq!(scheduler.state(), SchedulerState::Created);

        scheduler.stop();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert!(matches!(scheduler.run(), Err(SchedulerError::AlreadyStopped)));
        // Idempotent.
        scheduler.stop();
    }

    #[test]
    fn test_effective_interval() {
        let writer = Arc::new(InMemoryWriter::new(false));
        let scheduler = ExecutionScheduler::with_tick_time(
            Duration::from_secs(10),
            vec![
                executor("default", Duration::ZERO, writer.clone()),
                executor("own", Duration::from_secs(3), writer),
            ],
        );

        let stats = scheduler.stats();
        assert_eq!(stats[0].interval, Duration::from_secs(10));
        assert_eq!(stats[1].interval, Duration::from_secs(3));
        assert_eq!(scheduler.len(), 2);
        scheduler.stop();
    }

    #[test]
    fn test_run_triggers_immediately_and_stops() {
        let writer = Arc::new(InMemoryWriter::new(false));
        let scheduler = Arc::new(
            ExecutionScheduler::with_tick_time(
                Duration::from_secs(60),
                vec![executor("eager", Duration::ZERO, writer.clone())],
            )
            .tick_resolution(Duration::from_millis(20)),
        );

        let runner = {
            let scheduler = Arc::clone(&scheduler);
            std::thread::spawn(move || scheduler.run())
        };

        let deadline = Instant::now() + Duration::from_secs(2);
        while writer.write_calls() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(writer.write_calls(), 1);
        assert_eq!(scheduler.state(), SchedulerState::Running);
        assert!(matches!(scheduler.run(), Err(SchedulerError::AlreadyRunning)));

        scheduler.stop();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        runner.join().unwrap().unwrap();
        assert_eq!(scheduler.stats()[0].executed, 1);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SchedulerState::Stopping.to_string(), "stopping");
        assert_eq!(SchedulerState::Created.as_ref(), "created");
    }
}
