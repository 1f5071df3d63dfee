//! Core writer trait and handle types.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::source::SourceRef;
use crate::value::ValueSet;

/// Errors a writer can report.
#[derive(Debug, Error)]
pub enum WriterError {
    /// Network or file I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid writer configuration.
    #[error("config error: {0}")]
    Config(String),

    /// The writer refused the data.
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Declarative writer definition from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriterSpec {
    /// Registered writer type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific parameters.
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl WriterSpec {
    /// Create a spec without parameters.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: serde_json::Map::new(),
        }
    }

    /// Add a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Deserialize the parameters into a typed config.
    pub fn parse_params<T: DeserializeOwned>(&self) -> Result<T, WriterError> {
        serde_json::from_value(serde_json::Value::Object(self.params.clone()))
            .map_err(|e| WriterError::Config(format!("{}: {}", self.kind, e)))
    }

    /// Identity used to share one writer between equal specs.
    pub(crate) fn cache_key(&self) -> String {
        let params = serde_json::Value::Object(self.params.clone());
        format!("{}:{}", crate::registry::normalize(&self.kind), params)
    }
}

/// Capability implemented by every exporter.
///
/// In partial mode `write` is called from worker pool threads, one call per
/// completed source, possibly concurrently.
pub trait Writer: Send + Sync + 'static {
    /// Writer type, used for logging.
    fn kind(&self) -> &str;

    /// Whether the writer accepts incremental, per-source writes.
    ///
    /// Queried once when an executor is built. All writers of one executor
    /// must agree.
    fn supports_partial_write(&self) -> bool {
        false
    }

    /// Called once after construction.
    fn start(&self) -> Result<(), WriterError> {
        Ok(())
    }

    /// Called once at executor teardown.
    fn stop(&self) -> Result<(), WriterError> {
        Ok(())
    }

    /// Export `data`.
    ///
    /// `source` identifies the originating source in partial mode and is
    /// `None` for merged batch writes.
    fn write(&self, data: &[ValueSet], source: Option<&SourceRef>) -> Result<(), WriterError>;
}

/// Shared writer with at-most-once stop.
///
/// Global and de-duplicated writers are attached to several executors; the
/// first teardown that reaches the writer stops it, later ones are no-ops.
#[derive(Clone)]
pub struct WriterHandle {
    inner: Arc<dyn Writer>,
    stopped: Arc<AtomicBool>,
}

impl WriterHandle {
    /// Wrap a started writer.
    pub fn new(writer: Arc<dyn Writer>) -> Self {
        Self {
            inner: writer,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Writer type.
    pub fn kind(&self) -> &str {
        self.inner.kind()
    }

    /// See [`Writer::supports_partial_write`].
    pub fn supports_partial_write(&self) -> bool {
        self.inner.supports_partial_write()
    }

    /// See [`Writer::start`].
    pub fn start(&self) -> Result<(), WriterError> {
        self.inner.start()
    }

    /// See [`Writer::write`].
    pub fn write(&self, data: &[ValueSet], source: Option<&SourceRef>) -> Result<(), WriterError> {
        self.inner.write(data, source)
    }

    /// Stop the writer unless it was already stopped through any clone.
    ///
    /// Returns `Ok(false)` if this call was a no-op.
    pub fn stop(&self) -> Result<bool, WriterError> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        self.inner.stop().map(|()| true)
    }

    /// Whether this handle wraps `writer`.
    pub fn wraps(&self, writer: &Arc<dyn Writer>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(writer))
    }

    /// Whether two handles share the same writer instance.
    pub fn same_writer(&self, other: &WriterHandle) -> bool {
        Arc::ptr_eq(&self.stopped, &other.stopped)
    }
}

impl std::fmt::Debug for WriterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterHandle")
            .field("kind", &self.kind())
            .field("stopped", &self.stopped.load(Ordering::Relaxed))
            .finish()
    }
}
