//! Writer Layer
//!
//! Exporters that receive merged or per-source value sets from executors.
//!
//! - [`Writer`]: capability trait implemented by every exporter
//! - [`WriterHandle`]: shared handle with at-most-once stop
//! - [`dry_run`] / [`memory`]: built-in writers

pub mod dry_run;
pub mod memory;
mod traits;

pub use traits::{Writer, WriterError, WriterHandle, WriterSpec};
