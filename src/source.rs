//! Source Layer
//!
//! Data sources probed by executors. A source is any type implementing
//! [`Source`]; the built-ins here are thin adapters used for demos, dry runs
//! and tests. Vendor integrations live outside the core and plug in through
//! the [`Registry`](crate::registry::Registry).
//!
//! - [`dummy`]: fixed value with optional delay or failure
//! - [`tcp`]: TCP connect latency
//! - [`http`]: HTTP request latency

pub mod dummy;
pub mod http;
pub mod tcp;
mod traits;

pub use traits::{Source, SourceError, SourceId, SourceRef, SourceSpec};
