//! Per-executor job queue.
//!
//! The tick loop never blocks on an executor: it pushes `Job::Execute` with
//! `try_send` and counts the tick as dropped when a job is already waiting.
//! At most one cycle runs and at most one waits per executor.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};

/// Channel capacity: one pending execute plus the stop sentinel.
pub(crate) const QUEUE_CAPACITY: usize = 2;

/// How long `stop` waits for room for the sentinel.
const STOP_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Commands consumed by an executor worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Job {
    /// Run one collection cycle.
    Execute,
    /// Exit the worker loop.
    Stop,
}

#[derive(Debug, Default)]
struct Counters {
    executed: AtomicU64,
    dropped: AtomicU64,
    halted: AtomicBool,
}

/// Bounded queue feeding one executor worker.
#[derive(Debug, Clone)]
pub(crate) struct JobQueue {
    tx: Sender<Job>,
    rx: Receiver<Job>,
    counters: Arc<Counters>,
}

impl JobQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(QUEUE_CAPACITY);
        Self {
            tx,
            rx,
            counters: Arc::default(),
        }
    }

    /// Enqueue a cycle unless one is already pending.
    ///
    /// Returns `false` if the tick was dropped.
    pub(crate) fn schedule(&self) -> bool {
        if !self.tx.is_empty() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        match self.tx.try_send(Job::Execute) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Skip pending cycles and ask the worker to exit.
    pub(crate) fn stop(&self) {
        self.counters.halted.store(true, Ordering::Release);
        if let Err(e) = self.tx.send_timeout(Job::Stop, STOP_SEND_TIMEOUT) {
            tracing::warn!(error = %e, "Failed to enqueue stop sentinel");
        }
    }

    pub(crate) fn receiver(&self) -> &Receiver<Job> {
        &self.rx
    }

    /// Whether pending `Execute` jobs should be skipped.
    pub(crate) fn is_halted(&self) -> bool {
        self.counters.halted.load(Ordering::Acquire)
    }

    pub(crate) fn record_executed(&self) {
        self.counters.executed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn executed(&self) -> u64 {
        self.counters.executed.load(Ordering::Relaxed)
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn pending(&self) -> usize {
        self.tx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_tick_dropped_while_pending() {
        let queue = JobQueue::new();
        assert!(queue.schedule());
        assert!(!queue.schedule());
        assert!(!queue.schedule());
        assert_eq!(queue.dropped(), 2);
        assert_eq!(queue.pending(), 1);

        assert_eq!(queue.receiver().try_recv().unwrap(), Job::Execute);
        assert!(queue.schedule());
        assert_eq!(queue.dropped(), 2);
    }

    #[test]
    fn test_stop_fits_behind_pending_execute() {
        let queue = JobQueue::new();
        assert!(queue.schedule());
        queue.stop();
        assert!(queue.is_halted());

        let rx = queue.receiver();
        assert_eq!(rx.try_recv().unwrap(), Job::Execute);
        assert_eq!(rx.try_recv().unwrap(), Job::Stop);
    }
}
