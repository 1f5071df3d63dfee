//! Pollect - Metrics Collection Library
//!
//! This crate provides the core of the pollect collection daemon: executors
//! that periodically probe a set of sources concurrently, merge what they
//! return and hand it to writers. It can be embedded as a library or run as
//! a standalone binary with the `pollect` executable.
//!
//! # Architecture
//!
//! - **Value**: measurement model ([`Value`], [`ValueSet`], [`ValueCache`])
//! - **Source**: data producers implementing [`Source`]
//! - **Writer**: exporters implementing [`Writer`]
//! - **Execution**: [`Executor`], [`WorkerPool`] and [`ExecutionScheduler`]
//! - **Config**: YAML configuration and the [`Registry`] of source and writer types
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pollect::{AppConfig, Configuration, ExecutionScheduler, Registry};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = AppConfig::load("pollect.yml")?;
//!     let mut configuration = Configuration::new(app, Registry::with_builtins(), false)?;
//!     let executors = configuration.create_executors()?;
//!
//!     let scheduler = Arc::new(ExecutionScheduler::new(configuration.app(), executors));
//!     let runner = {
//!         let scheduler = Arc::clone(&scheduler);
//!         std::thread::spawn(move || scheduler.run())
//!     };
//!
//!     // ... later, e.g. on a signal
//!     scheduler.stop();
//!     runner.join().expect("scheduler thread panicked")?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod execution;
pub mod registry;
pub mod source;
pub mod value;
pub mod writer;

// Re-export commonly used types
pub use config::{AppConfig, ConfigError, Configuration, ExecutorConfig};
pub use execution::{
    ExecutionScheduler, Executor, ExecutorBuilder, PoolError, SchedulerError, SchedulerState,
    WorkerPool, WriteMode,
};
pub use registry::Registry;
pub use source::{Source, SourceError, SourceId, SourceRef, SourceSpec};
pub use value::{Value, ValueCache, ValueSet};
pub use writer::{Writer, WriterError, WriterHandle, WriterSpec};
