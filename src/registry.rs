//! Source and writer registry.
//!
//! Maps type identifiers from configuration to factory functions. Lookup
//! ignores ASCII case, `_` and `-`, so `in_memory`, `InMemory` and
//! `in-memory` name the same writer.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ConfigError;
use crate::source::{self, Source, SourceError, SourceSpec};
use crate::writer::{self, Writer, WriterError, WriterHandle, WriterSpec};

/// Builds a source from its configuration.
pub type SourceFactory =
    Box<dyn Fn(&SourceSpec) -> Result<Box<dyn Source>, SourceError> + Send + Sync>;

/// Builds a writer from its configuration.
pub type WriterFactory =
    Box<dyn Fn(&WriterSpec) -> Result<Arc<dyn Writer>, WriterError> + Send + Sync>;

/// Canonical form of a type identifier.
pub(crate) fn normalize(kind: &str) -> String {
    kind.chars()
        .filter(|c| !matches!(c, '_' | '-'))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Explicit type registry.
#[derive(Default)]
pub struct Registry {
    sources: HashMap<String, SourceFactory>,
    writers: HashMap<String, WriterFactory>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in sources and writers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_source(source::dummy::KIND, |spec| {
            Ok(Box::new(source::dummy::DummySource::from_spec(spec)?))
        });
        registry.register_source(source::tcp::KIND, |spec| {
            Ok(Box::new(source::tcp::TcpSource::from_spec(spec)?))
        });
        registry.register_source(source::http::KIND, |spec| {
            Ok(Box::new(source::http::HttpSource::from_spec(spec)?))
        });
        registry.register_writer(writer::dry_run::KIND, |_| {
            Ok(Arc::new(writer::dry_run::DryRunWriter::new(writer::dry_run::KIND)))
        });
        registry.register_writer(writer::memory::KIND, |spec| {
            Ok(Arc::new(writer::memory::InMemoryWriter::from_spec(spec)?))
        });
        registry
    }

    /// Register (or replace) a source factory.
    pub fn register_source<F>(&mut self, kind: &str, factory: F) -> &mut Self
    where
        F: Fn(&SourceSpec) -> Result<Box<dyn Source>, SourceError> + Send + Sync + 'static,
    {
        self.sources.insert(normalize(kind), Box::new(factory));
        self
    }

    /// Register (or replace) a writer factory.
    pub fn register_writer<F>(&mut self, kind: &str, factory: F) -> &mut Self
    where
        F: Fn(&WriterSpec) -> Result<Arc<dyn Writer>, WriterError> + Send + Sync + 'static,
    {
        self.writers.insert(normalize(kind), Box::new(factory));
        self
    }

    /// Whether a source type is registered.
    pub fn has_source(&self, kind: &str) -> bool {
        self.sources.contains_key(&normalize(kind))
    }

    /// Whether a writer type is registered.
    pub fn has_writer(&self, kind: &str) -> bool {
        self.writers.contains_key(&normalize(kind))
    }

    /// Registered source types, sorted.
    pub fn source_kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<_> = self.sources.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Instantiate a source.
    ///
    /// # Errors
    /// `UnknownSource` for unregistered types, `InvalidSource` if the factory fails.
    pub fn create_source(&self, spec: &SourceSpec) -> Result<Box<dyn Source>, ConfigError> {
        let factory = self
            .sources
            .get(&normalize(&spec.kind))
            .ok_or_else(|| ConfigError::UnknownSource(spec.kind.clone()))?;
        factory(spec).map_err(|e| ConfigError::InvalidSource {
            kind: spec.id().to_string(),
            reason: e.to_string(),
        })
    }

    /// Instantiate a writer without starting it.
    ///
    /// # Errors
    /// `UnknownWriter` for unregistered types, `InvalidWriter` if the factory fails.
    pub fn create_writer(&self, spec: &WriterSpec) -> Result<Arc<dyn Writer>, ConfigError> {
        let factory = self
            .writers
            .get(&normalize(&spec.kind))
            .ok_or_else(|| ConfigError::UnknownWriter(spec.kind.clone()))?;
        factory(spec).map_err(|e| ConfigError::InvalidWriter {
            kind: spec.kind.clone(),
            reason: e.to_string(),
        })
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut writers: Vec<_> = self.writers.keys().collect();
        writers.sort_unstable();
        f.debug_struct("Registry")
            .field("sources", &self.source_kinds())
            .field("writers", &writers)
            .finish()
    }
}

/// Started writers keyed by specification.
///
/// Equal specs resolve to one shared, started writer. In dry-run mode every
/// spec resolves to a [`DryRunWriter`](crate::writer::dry_run::DryRunWriter)
/// named after the writer type it replaces.
#[derive(Debug, Default)]
pub struct WriterCache {
    dry_run: bool,
    entries: HashMap<String, WriterHandle>,
}

impl WriterCache {
    /// Create a cache.
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            entries: HashMap::new(),
        }
    }

    /// Number of distinct writers created.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no writer was created yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the writer for `spec`, creating and starting it on first use.
    pub fn get_or_create(
        &mut self,
        registry: &Registry,
        spec: &WriterSpec,
    ) -> Result<WriterHandle, ConfigError> {
        // Unknown types fail even in dry-run mode.
        if !registry.has_writer(&spec.kind) {
            return Err(ConfigError::UnknownWriter(spec.kind.clone()));
        }

        let key = if self.dry_run {
            format!("dryrun:{}", normalize(&spec.kind))
        } else {
            spec.cache_key()
        };
        if let Some(handle) = self.entries.get(&key) {
            return Ok(handle.clone());
        }

        let instance: Arc<dyn Writer> = if self.dry_run {
            tracing::info!(writer = %spec.kind, "Dry run: replacing writer");
            Arc::new(writer::dry_run::DryRunWriter::new(spec.kind.clone()))
        } else {
            registry.create_writer(spec)?
        };
        instance.start().map_err(|e| ConfigError::InvalidWriter {
            kind: spec.kind.clone(),
            reason: e.to_string(),
        })?;
        tracing::debug!(writer = %spec.kind, "Writer started");

        let handle = WriterHandle::new(instance);
        self.entries.insert(key, handle.clone());
        Ok(handle)
    }
}
