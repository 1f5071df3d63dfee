//! Execution Layer
//!
//! Everything that turns configured sources and writers into periodic
//! collection cycles.
//!
//! # Architecture
//!
//! ```text
//! ExecutionScheduler (tick loop)
//!   ├── JobQueue ──► executor worker ──► Executor::execute
//!   │                                     └── WorkerPool ──► Source::probe
//!   └── ...                                   └── Writer::write
//! ```
//!
//! - [`ExecutionScheduler`]: lifecycle and per-executor timing
//! - [`Executor`]: one collection cycle (probe, merge, write)
//! - [`WorkerPool`]: bounded concurrency for probes

mod executor;
mod pool;
mod queue;
mod scheduler;

pub use executor::{Executor, ExecutorBuilder, SLOW_PROBE_THRESHOLD, WriteMode};
pub use pool::{DEFAULT_POOL_SIZE, PoolError, TaskHandle, WorkerPool};
pub use scheduler::{
    DEFAULT_TICK_RESOLUTION, ExecutionScheduler, ExecutorStats, SchedulerError, SchedulerState,
};
