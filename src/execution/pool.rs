//! Bounded worker pool for concurrent source probing.
//!
//! A fixed set of threads consumes boxed tasks from a shared channel. Each
//! submission gets a [`TaskHandle`] that yields the task's result, which is
//! what batch-mode executors join on. Panics inside a task are caught and
//! reported through the handle; they never take a worker thread down.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

/// Default number of workers per pool.
pub const DEFAULT_POOL_SIZE: usize = 5;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Errors returned by the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool no longer accepts submissions.
    #[error("worker pool is shut down")]
    ShutDown,

    /// The task panicked.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The task was dropped without producing a result.
    #[error("task result channel disconnected")]
    Disconnected,

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Render a panic payload for logging.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle to a submitted task's result.
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: Receiver<thread::Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Block until the task finishes and return its result.
    pub fn join(self) -> Result<T, PoolError> {
        match self.rx.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => Err(PoolError::Panicked(panic_message(payload.as_ref()))),
            Err(_) => Err(PoolError::Disconnected),
        }
    }

    /// Whether the result is ready.
    pub fn is_finished(&self) -> bool {
        !self.rx.is_empty()
    }
}

/// Fixed-size thread pool.
pub struct WorkerPool {
    name: String,
    size: usize,
    tx: Mutex<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn a pool of `size` workers (at least one).
    ///
    /// Worker threads are named `{name}-{index}`.
    pub fn new(name: impl Into<String>, size: usize) -> Result<Self, PoolError> {
        let name = name.into();
        let size = size.max(1);
        let (tx, rx) = crossbeam_channel::unbounded::<Task>();

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || work(rx))?;
            workers.push(handle);
        }
        tracing::debug!(pool = %name, size, "Worker pool started");

        Ok(Self {
            name,
            size,
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        })
    }

    /// Pool name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Submit a task.
    ///
    /// # Errors
    /// Returns `PoolError::ShutDown` after [`shutdown`](Self::shutdown).
    pub fn submit<F, T>(&self, task: F) -> Result<TaskHandle<T>, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = crossbeam_channel::bounded(1);
        let task: Task = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(task));
            // The submitter may have stopped waiting; nothing to do then.
            let _ = result_tx.send(outcome);
        });

        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = tx.as_ref() else {
            return Err(PoolError::ShutDown);
        };
        tx.send(task).map_err(|_| PoolError::ShutDown)?;
        Ok(TaskHandle { rx: result_rx })
    }

    /// Whether the pool rejects new submissions.
    pub fn is_shut_down(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Stop accepting tasks.
    ///
    /// Already queued tasks still run. With `wait`, blocks until every worker
    /// has drained the queue and exited. Calling it again is a no-op.
    pub fn shutdown(&self, wait: bool) {
        let sender = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let workers =
            std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        if !wait {
            return;
        }
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!(pool = %self.name, "Worker thread panicked");
            }
        }
        tracing::debug!(pool = %self.name, "Worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown(false);
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

fn work(rx: Receiver<Task>) {
    // Ends once every sender is gone and the queue is drained.
    while let Ok(task) = rx.recv() {
        task();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    #[test]
    fn test_submit_and_join() {
        let pool = WorkerPool::new("test", 2).unwrap();
        let handle = pool.submit(|| 21 * 2).unwrap();
        assert_eq!(handle.join().unwrap(), 42);
        pool.shutdown(true);
    }

    #[test]
    fn test_runs_tasks_concurrently() {
        let pool = WorkerPool::new("concurrent", 3).unwrap();
        let start = Instant::now();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                pool.submit(|| std::thread::sleep(Duration::from_millis(300)))
                    .unwrap()
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(850));
        pool.shutdown(true);
    }

    #[test]
    fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new("bounded", 2).unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let (active, peak) = (Arc::clone(&active), Arc::clone(&peak));
                pool.submit(move || {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(50));
                    active.fetch_sub(1, Ordering::SeqCst);
                })
                .unwrap()
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        pool.shutdown(true);
    }

    #[test]
    fn test_panic_is_reported_and_pool_survives() {
        let pool = WorkerPool::new("panicky", 1).unwrap();
        let failed = pool.submit(|| -> u32 { panic!("boom") }).unwrap();
        match failed.join() {
            Err(PoolError::Panicked(msg)) => assert_eq!(msg, "boom"),
            other => panic!("expected panic error, got {other:?}"),
        }

        let ok = pool.submit(|| 7).unwrap();
        assert_eq!(ok.join().unwrap(), 7);
        pool.shutdown(true);
    }

    #[test]
    fn test_submit_after_shutdown_rejected() {
        let pool = WorkerPool::new("closed", 1).unwrap();
        pool.shutdown(true);
        assert!(pool.is_shut_down());
        assert!(matches!(pool.submit(|| ()), Err(PoolError::ShutDown)));
        // Second shutdown is a no-op.
        pool.shutdown(true);
    }

    #[test]
    fn test_shutdown_drains_queued_tasks() {
        let pool = WorkerPool::new("drain", 1).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let done = Arc::clone(&done);
            pool.submit(move || {
                std::thread::sleep(Duration::from_millis(10));
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.shutdown(true);
        assert_eq!(done.load(Ordering::SeqCst), 4);
    }
}
