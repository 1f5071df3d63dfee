//! Collection executor.
//!
//! An executor owns one collection: its sources, the writers they export to,
//! and a worker pool that probes the sources concurrently. Each call to
//! [`Executor::execute`] is one collection cycle.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use strum_macros::{AsRefStr, Display};

use crate::config::ConfigError;
use crate::execution::pool::{DEFAULT_POOL_SIZE, WorkerPool, panic_message};
use crate::source::{Source, SourceId, SourceRef};
use crate::value::ValueSet;
use crate::writer::{Writer, WriterHandle};

// =============================================================================
// Constants
// =============================================================================

/// Probes running longer than this are reported.
pub const SLOW_PROBE_THRESHOLD: Duration = Duration::from_secs(10);

// =============================================================================
// Types
// =============================================================================

/// How collected data reaches the writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "lowercase")]
pub enum WriteMode {
    /// All sources are merged and written once per cycle.
    Batch,
    /// Each source is written as soon as its probe completes.
    Partial,
}

struct Probe {
    id: SourceId,
    reference: SourceRef,
    source: Box<dyn Source>,
}

/// State shared between the executor and its pool tasks.
struct Dispatch {
    collection: String,
    writers: Vec<WriterHandle>,
    slow_probe: Duration,
}

impl Dispatch {
    /// Probe one source; failures are logged and yield no data.
    fn probe(&self, probe: &Probe) -> Vec<ValueSet> {
        let span = tracing::debug_span!("probe", source = %probe.id);
        let _enter = span.enter();

        tracing::debug!("Collecting data");
        let start = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| probe.source.probe()));
        let elapsed = start.elapsed();

        if elapsed > self.slow_probe {
            tracing::warn!(
                collection = %self.collection,
                source = %probe.id,
                elapsed_ms = elapsed.as_millis() as u64,
                "Probe took longer than {}s",
                self.slow_probe.as_secs()
            );
        }

        match result {
            Ok(Ok(sets)) => sets,
            Ok(Err(e)) => {
                tracing::error!(
                    collection = %self.collection,
                    source = %probe.id,
                    error = %e,
                    "Error while probing source"
                );
                Vec::new()
            }
            Err(payload) => {
                tracing::error!(
                    collection = %self.collection,
                    source = %probe.id,
                    panic = %panic_message(payload.as_ref()),
                    "Source panicked while probing"
                );
                Vec::new()
            }
        }
    }

    /// Stamp, prefix and append `sets` to `out`.
    fn merge(&self, sets: Vec<ValueSet>, time: i64, out: &mut Vec<ValueSet>) {
        for mut set in sets {
            if let Err(e) = set.validate() {
                tracing::warn!(collection = %self.collection, error = %e, "Dropping invalid value set");
                continue;
            }
            set.time = time;
            set.name = if set.name.is_empty() {
                self.collection.clone()
            } else {
                format!("{}.{}", self.collection, set.name)
            };
            out.push(set);
        }
    }

    /// Hand `sets` to every writer; one failing writer does not affect the rest.
    fn write(&self, sets: &[ValueSet], source: Option<&SourceRef>) {
        if sets.is_empty() {
            tracing::debug!(collection = %self.collection, "No data to write");
            return;
        }

        for writer in &self.writers {
            let result = panic::catch_unwind(AssertUnwindSafe(|| writer.write(sets, source)));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(
                    collection = %self.collection,
                    writer = writer.kind(),
                    source = source.map(SourceRef::label),
                    error = %e,
                    "Error while writing"
                ),
                Err(payload) => tracing::error!(
                    collection = %self.collection,
                    writer = writer.kind(),
                    source = source.map(SourceRef::label),
                    panic = %panic_message(payload.as_ref()),
                    "Writer panicked"
                ),
            }
        }
    }
}

fn unix_now() -> i64 {
    Utc::now().timestamp()
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`Executor`].
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use pollect::execution::ExecutorBuilder;
/// use pollect::source::dummy::{DummyConfig, DummySource};
/// use pollect::writer::dry_run::DryRunWriter;
///
/// let executor = ExecutorBuilder::new("pollect")
///     .tick_time(Duration::from_secs(30))
///     .source(DummySource::new(None, DummyConfig::default()))
///     .writer(DryRunWriter::new("stdout"))
///     .build()?;
/// executor.execute();
/// # Ok::<(), pollect::config::ConfigError>(())
/// ```
pub struct ExecutorBuilder {
    collection: String,
    tick_time: Option<Duration>,
    threads: usize,
    slow_probe: Duration,
    sources: Vec<Box<dyn Source>>,
    /// Writers paired with whether `build` must start them.
    writers: Vec<(WriterHandle, bool)>,
}

impl ExecutorBuilder {
    /// Start building an executor for `collection`.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            tick_time: None,
            threads: DEFAULT_POOL_SIZE,
            slow_probe: SLOW_PROBE_THRESHOLD,
            sources: Vec::new(),
            writers: Vec::new(),
        }
    }

    /// Own tick interval; zero means "use the scheduler's default".
    pub fn tick_time(mut self, tick_time: Duration) -> Self {
        self.tick_time = (!tick_time.is_zero()).then_some(tick_time);
        self
    }

    /// Worker pool size.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Threshold above which a probe is reported as slow.
    pub fn slow_probe_threshold(mut self, threshold: Duration) -> Self {
        self.slow_probe = threshold;
        self
    }

    /// Add a source. Sources are merged in the order they are added.
    pub fn source(self, source: impl Source) -> Self {
        self.boxed_source(Box::new(source))
    }

    /// Add an already boxed source.
    pub fn boxed_source(mut self, source: Box<dyn Source>) -> Self {
        self.sources.push(source);
        self
    }

    /// Add a writer owned by this executor; it is started by [`build`](Self::build).
    pub fn writer(self, writer: impl Writer) -> Self {
        self.shared_writer(Arc::new(writer))
    }

    /// Add a writer the caller keeps a reference to; started by [`build`](Self::build).
    ///
    /// The writer is started and stopped by this executor. To share one
    /// writer between several executors, start it once and attach clones of
    /// a single [`WriterHandle`] with [`writer_handle`](Self::writer_handle).
    /// Passing the same instance twice to one builder attaches it once.
    pub fn shared_writer(mut self, writer: Arc<dyn Writer>) -> Self {
        if self.writers.iter().any(|(handle, _)| handle.wraps(&writer)) {
            return self;
        }
        self.writers.push((WriterHandle::new(writer), true));
        self
    }

    /// Attach an already started writer that may be shared with other executors.
    pub fn writer_handle(mut self, handle: WriterHandle) -> Self {
        self.writers.push((handle, false));
        self
    }

    /// Validate and build the executor.
    ///
    /// # Errors
    /// - `NoWriter` if no writer was attached
    /// - `MixedPartialWrite` if writers disagree on partial-write support
    /// - `InvalidWriter` if starting a writer fails
    pub fn build(self) -> Result<Executor, ConfigError> {
        if self.collection.is_empty() {
            return Err(ConfigError::ValidationError(
                "executor collection must not be empty".to_string(),
            ));
        }
        if self.threads == 0 {
            return Err(ConfigError::ValidationError(format!(
                "executor '{}': threads must be greater than 0",
                self.collection
            )));
        }

        let Some((first, _)) = self.writers.first() else {
            return Err(ConfigError::NoWriter {
                collection: self.collection,
            });
        };
        let partial = first.supports_partial_write();
        if self
            .writers
            .iter()
            .any(|(w, _)| w.supports_partial_write() != partial)
        {
            return Err(ConfigError::MixedPartialWrite {
                collection: self.collection,
            });
        }

        for (writer, start) in &self.writers {
            if *start {
                writer.start().map_err(|e| ConfigError::InvalidWriter {
                    kind: writer.kind().to_string(),
                    reason: e.to_string(),
                })?;
            }
        }

        let pool = WorkerPool::new(format!("{}-probe", self.collection), self.threads)?;
        let probes = self
            .sources
            .into_iter()
            .map(|source| {
                let id = source.id();
                Arc::new(Probe {
                    reference: SourceRef::issue(&id),
                    id,
                    source,
                })
            })
            .collect();

        let mode = if partial {
            WriteMode::Partial
        } else {
            WriteMode::Batch
        };
        tracing::debug!(collection = %self.collection, mode = %mode, "Executor created");

        Ok(Executor {
            dispatch: Arc::new(Dispatch {
                collection: self.collection,
                writers: self.writers.into_iter().map(|(w, _)| w).collect(),
                slow_probe: self.slow_probe,
            }),
            tick_time: self.tick_time,
            mode,
            probes,
            pool,
            shut_down: AtomicBool::new(false),
        })
    }
}

// =============================================================================
// Executor
// =============================================================================

/// Runs collection cycles for one collection.
pub struct Executor {
    dispatch: Arc<Dispatch>,
    tick_time: Option<Duration>,
    mode: WriteMode,
    probes: Vec<Arc<Probe>>,
    pool: WorkerPool,
    shut_down: AtomicBool,
}

impl Executor {
    /// Start building an executor.
    pub fn builder(collection: impl Into<String>) -> ExecutorBuilder {
        ExecutorBuilder::new(collection)
    }

    /// Collection name, used as prefix for every value set.
    pub fn collection(&self) -> &str {
        &self.dispatch.collection
    }

    /// Own tick interval, if configured.
    pub fn tick_time(&self) -> Option<Duration> {
        self.tick_time
    }

    /// Write mode derived from the writers.
    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Identities of the configured sources, in declaration order.
    pub fn source_ids(&self) -> Vec<SourceId> {
        self.probes.iter().map(|p| p.id.clone()).collect()
    }

    /// Writers attached to this executor.
    pub fn writers(&self) -> &[WriterHandle] {
        &self.dispatch.writers
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Run one collection cycle.
    ///
    /// Returns after every probe (and, in partial mode, every write) of this
    /// cycle has finished. Source and writer failures are logged, never
    /// propagated.
    pub fn execute(&self) {
        let span = tracing::info_span!("executor", collection = %self.dispatch.collection);
        let _enter = span.enter();

        if self.is_shut_down() {
            tracing::warn!("Executor is shut down, skipping cycle");
            return;
        }

        match self.mode {
            WriteMode::Batch => self.execute_batch(),
            WriteMode::Partial => self.execute_partial(),
        }
    }

    fn execute_batch(&self) {
        // One timestamp for the whole cycle.
        let time = unix_now();

        let handles: Vec<_> = self
            .probes
            .iter()
            .map(|probe| {
                let dispatch = Arc::clone(&self.dispatch);
                let task = Arc::clone(probe);
                (probe, self.pool.submit(move || dispatch.probe(&task)))
            })
            .collect();

        let mut merged = Vec::new();
        for (probe, handle) in handles {
            match handle.and_then(|h| h.join()) {
                Ok(sets) => self.dispatch.merge(sets, time, &mut merged),
                Err(e) => tracing::error!(source = %probe.id, error = %e, "Probe task failed"),
            }
        }

        self.dispatch.write(&merged, None);
    }

    fn execute_partial(&self) {
        let handles: Vec<_> = self
            .probes
            .iter()
            .map(|probe| {
                let dispatch = Arc::clone(&self.dispatch);
                let task = Arc::clone(probe);
                let handle = self.pool.submit(move || {
                    let time = unix_now();
                    let sets = dispatch.probe(&task);
                    let mut merged = Vec::with_capacity(sets.len());
                    dispatch.merge(sets, time, &mut merged);
                    dispatch.write(&merged, Some(&task.reference));
                });
                (probe, handle)
            })
            .collect();

        // Wait so cycles of one executor never overlap.
        for (probe, handle) in handles {
            if let Err(e) = handle.and_then(|h| h.join()) {
                tracing::error!(source = %probe.id, error = %e, "Probe task failed");
            }
        }
    }

    /// Release the pool, every source and every writer.
    ///
    /// Runs at most once; later calls return immediately.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let collection = &self.dispatch.collection;
        tracing::info!(collection = %collection, "Shutting down executor");

        self.pool.shutdown(true);

        for probe in &self.probes {
            match panic::catch_unwind(AssertUnwindSafe(|| probe.source.shutdown())) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(
                    collection = %collection,
                    source = %probe.id,
                    error = %e,
                    "Error while shutting down source"
                ),
                Err(payload) => tracing::error!(
                    collection = %collection,
                    source = %probe.id,
                    panic = %panic_message(payload.as_ref()),
                    "Source panicked during shutdown"
                ),
            }
        }

        for writer in &self.dispatch.writers {
            match writer.stop() {
                Ok(true) => tracing::debug!(collection = %collection, writer = writer.kind(), "Writer stopped"),
                Ok(false) => {}
                Err(e) => tracing::error!(
                    collection = %collection,
                    writer = writer.kind(),
                    error = %e,
                    "Error while stopping writer"
                ),
            }
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("collection", &self.dispatch.collection)
            .field("tick_time", &self.tick_time)
            .field("mode", &self.mode)
            .field("sources", &self.source_ids())
            .field("writers", &self.dispatch.writers)
            .finish()
    }
}
