//! Measurement model.
//!
//! Sources produce [`ValueSet`]s on every probe; the executor stamps and
//! prefixes them before handing them to writers.
//!
//! - [`Value`]: a single measurement with optional name and label values
//! - [`ValueSet`]: named, labeled collection sharing one label schema
//! - [`ValueCache`]: synchronized averaging buffer for push-fed sources

mod cache;
mod set;

pub use cache::{ValueCache, ValueCacheGuard};
pub use set::{Value, ValueError, ValueSet};
