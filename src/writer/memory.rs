//! In-process writer that keeps everything it receives.
//!
//! Handy for tests and for embedding the scheduler in another program that
//! wants to inspect collected data directly.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::source::SourceRef;
use crate::value::ValueSet;
use crate::writer::{Writer, WriterError, WriterSpec};

/// Writer type identifier.
pub const KIND: &str = "in_memory";

/// Configuration for the in-memory writer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryConfig {
    /// Advertise partial-write support (default: false).
    #[serde(default)]
    pub partial: bool,
}

#[derive(Debug, Default)]
struct Recorded {
    batches: Vec<(Option<SourceRef>, Vec<ValueSet>)>,
    latest: HashMap<SourceRef, Vec<ValueSet>>,
}

/// Records every write.
#[derive(Debug, Default)]
pub struct InMemoryWriter {
    config: InMemoryConfig,
    recorded: Mutex<Recorded>,
}

impl InMemoryWriter {
    /// Create a writer with the given partial-write capability.
    pub fn new(partial: bool) -> Self {
        Self {
            config: InMemoryConfig { partial },
            recorded: Mutex::default(),
        }
    }

    /// Build from a configuration spec.
    pub fn from_spec(spec: &WriterSpec) -> Result<Self, WriterError> {
        let config: InMemoryConfig = spec.parse_params()?;
        Ok(Self::new(config.partial))
    }

    /// Every batch written so far, in write order.
    pub fn batches(&self) -> Vec<Vec<ValueSet>> {
        self.recorded().batches.iter().map(|(_, sets)| sets.clone()).collect()
    }

    /// Source reference passed with each write, in write order.
    pub fn sources(&self) -> Vec<Option<SourceRef>> {
        self.recorded().batches.iter().map(|(source, _)| source.clone()).collect()
    }

    /// Number of `write` calls received.
    pub fn write_calls(&self) -> usize {
        self.recorded().batches.len()
    }

    /// Most recent batch written for `source` in partial mode.
    pub fn latest_for(&self, source: &SourceRef) -> Option<Vec<ValueSet>> {
        self.recorded().latest.get(source).cloned()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        let mut recorded = self.recorded();
        recorded.batches.clear();
        recorded.latest.clear();
    }

    fn recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Writer for InMemoryWriter {
    fn kind(&self) -> &str {
        KIND
    }

    fn supports_partial_write(&self) -> bool {
        self.config.partial
    }

    fn write(&self, data: &[ValueSet], source: Option<&SourceRef>) -> Result<(), WriterError> {
        let mut recorded = self.recorded();
        recorded.batches.push((source.cloned(), data.to_vec()));
        if let Some(source) = source {
            recorded.latest.insert(source.clone(), data.to_vec());
        }
        Ok(())
    }
}
