//! Turns a validated [`AppConfig`] into running objects.

use crate::execution::{Executor, ExecutorBuilder};
use crate::registry::{Registry, WriterCache};
use crate::writer::WriterHandle;

use super::app::{AppConfig, ExecutorConfig};
use super::validation::ConfigError;

/// Resolved configuration: global writers plus the registry that builds
/// everything else.
#[derive(Debug)]
pub struct Configuration {
    app: AppConfig,
    registry: Registry,
    writers: WriterCache,
    global_writers: Vec<WriterHandle>,
}

impl Configuration {
    /// Validate `app` and instantiate the global writers.
    ///
    /// With `dry_run`, every writer is replaced by a logging writer.
    pub fn new(app: AppConfig, registry: Registry, dry_run: bool) -> Result<Self, ConfigError> {
        app.validate()?;

        let mut writers = WriterCache::new(dry_run);
        let global_writers = app
            .global_writers()
            .map(|spec| writers.get_or_create(&registry, spec))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            app,
            registry,
            writers,
            global_writers,
        })
    }

    /// Global settings.
    pub fn app(&self) -> &AppConfig {
        &self.app
    }

    /// Started global writers.
    pub fn global_writers(&self) -> &[WriterHandle] {
        &self.global_writers
    }

    /// Build one executor per configured collection.
    ///
    /// # Errors
    /// Unknown types, failing source setup, missing or mixed writers.
    /// Executors built before the failing one are shut down.
    pub fn create_executors(&mut self) -> Result<Vec<Executor>, ConfigError> {
        let mut executors: Vec<Executor> = Vec::with_capacity(self.app.executors.len());
        for config in &self.app.executors {
            let executor = match Self::create_executor(
                &self.app,
                &self.registry,
                &mut self.writers,
                &self.global_writers,
                config,
            ) {
                Ok(executor) => executor,
                Err(e) => {
                    tracing::error!(collection = %config.collection, error = %e, "Failed to create executor");
                    for built in &executors {
                        built.shutdown();
                    }
                    return Err(e);
                }
            };
            tracing::info!(
                collection = %executor.collection(),
                sources = executor.source_ids().len(),
                writers = executor.writers().len(),
                mode = %executor.mode(),
                "Executor configured"
            );
            executors.push(executor);
        }
        Ok(executors)
    }

    fn create_executor(
        app: &AppConfig,
        registry: &Registry,
        writers: &mut WriterCache,
        global_writers: &[WriterHandle],
        config: &ExecutorConfig,
    ) -> Result<Executor, ConfigError> {
        let mut builder = ExecutorBuilder::new(config.collection.clone()).threads(app.threads);
        if let Some(tick) = config.effective_tick_time() {
            builder = builder.tick_time(tick);
        }

        // A local writer replaces the global ones.
        let handles = match &config.writer {
            Some(spec) => vec![writers.get_or_create(registry, spec)?],
            None => global_writers.to_vec(),
        };
        if handles.is_empty() {
            return Err(ConfigError::NoWriter {
                collection: config.collection.clone(),
            });
        }
        for handle in handles {
            builder = builder.writer_handle(handle);
        }

        for spec in &config.sources {
            let mut source = registry.create_source(spec)?;
            source.setup(app).map_err(|e| ConfigError::InvalidSource {
                kind: spec.id().to_string(),
                reason: e.to_string(),
            })?;
            builder = builder.boxed_source(source);
        }

        builder.build()
    }
}
