//! Application configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::execution::DEFAULT_POOL_SIZE;
use crate::source::SourceSpec;
use crate::writer::WriterSpec;

use super::validation::{ConfigError, expand_yaml};

// =============================================================================
// Constants
// =============================================================================

/// Default collection interval (10 seconds).
pub const DEFAULT_TICK_TIME: Duration = Duration::from_secs(10);

/// Minimum collection interval (1 second).
pub const MIN_TICK_TIME: Duration = Duration::from_secs(1);

fn default_tick_time() -> Duration {
    DEFAULT_TICK_TIME
}

fn default_threads() -> usize {
    DEFAULT_POOL_SIZE
}

// =============================================================================
// Executor Configuration
// =============================================================================

/// One collection: its sources, interval and optional local writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Prefix for every value set produced by this executor.
    pub collection: String,

    /// Own interval; absent or zero means the global `tick_time`.
    #[serde(
        default,
        alias = "tickTime",
        with = "super::validation::option_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub tick_time: Option<Duration>,

    /// Local writer replacing the global ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer: Option<WriterSpec>,

    /// Sources in merge order.
    #[serde(default)]
    pub sources: Vec<SourceSpec>,
}

impl ExecutorConfig {
    /// Create an executor configuration without sources.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            tick_time: None,
            writer: None,
            sources: Vec::new(),
        }
    }

    /// Own interval if set and non-zero.
    pub fn effective_tick_time(&self) -> Option<Duration> {
        self.tick_time.filter(|d| !d.is_zero())
    }
}

// =============================================================================
// App Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default interval for executors without their own.
    #[serde(
        default = "default_tick_time",
        alias = "tickTime",
        with = "super::validation::duration"
    )]
    pub tick_time: Duration,

    /// Worker pool size per executor.
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Single global writer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer: Option<WriterSpec>,

    /// Additional global writers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub writers: Vec<WriterSpec>,

    /// Collections to run.
    #[serde(default)]
    pub executors: Vec<ExecutorConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tick_time: DEFAULT_TICK_TIME,
            threads: DEFAULT_POOL_SIZE,
            writer: None,
            writers: Vec::new(),
            executors: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// String values are env-expanded before the document is interpreted.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse, expand and validate a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut document: serde_yaml::Value = serde_yaml::from_str(content)?;
        expand_yaml(&mut document)?;
        let config: Self = serde_yaml::from_value(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Global writer specs, `writer` first.
    pub fn global_writers(&self) -> impl Iterator<Item = &WriterSpec> {
        self.writer.iter().chain(self.writers.iter())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_time < MIN_TICK_TIME {
            return Err(ConfigError::ValidationError(format!(
                "tick_time must be at least {}",
                humantime::format_duration(MIN_TICK_TIME)
            )));
        }

        if self.threads == 0 {
            return Err(ConfigError::ValidationError(
                "threads must be greater than 0".to_string(),
            ));
        }

        if self.executors.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one executor is required".to_string(),
            ));
        }

        for (index, executor) in self.executors.iter().enumerate() {
            if executor.collection.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "executors[{index}]: collection must not be empty"
                )));
            }

            if let Some(tick) = executor.effective_tick_time()
                && tick < MIN_TICK_TIME
            {
                return Err(ConfigError::ValidationError(format!(
                    "executor '{}': tick_time must be at least {}",
                    executor.collection,
                    humantime::format_duration(MIN_TICK_TIME)
                )));
            }

            if let Some(source) = executor.sources.iter().find(|s| s.kind.trim().is_empty()) {
                return Err(ConfigError::ValidationError(format!(
                    "executor '{}': source{} has no type",
                    executor.collection,
                    source.name.as_deref().map(|n| format!(" '{n}'")).unwrap_or_default()
                )));
            }

            if executor.sources.is_empty() {
                tracing::warn!(collection = %executor.collection, "Executor has no sources");
            }
        }

        for writer in self
            .global_writers()
            .chain(self.executors.iter().filter_map(|e| e.writer.as_ref()))
        {
            if writer.kind.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "writer type must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
tick_time: 15s
threads: 2
writer:
  type: dry_run
executors:
  - collection: pollect
    sources:
      - type: dummy
        name: one
        value: 1
  - collection: slow
    tick_time: 1m
    writer:
      type: in_memory
      partial: true
    sources:
      - type: dummy
"#;

    #[test]
    fn test_app_config_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.tick_time, DEFAULT_TICK_TIME);
        assert_eq!(config.threads, DEFAULT_POOL_SIZE);
        assert!(config.writer.is_none());
        assert!(config.executors.is_empty());
    }

    #[test]
    fn test_from_yaml_sample() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.tick_time, Duration::from_secs(15));
        assert_eq!(config.threads, 2);
        assert_eq!(config.global_writers().count(), 1);
        assert_eq!(config.executors.len(), 2);
        assert_eq!(config.executors[0].effective_tick_time(), None);
        assert_eq!(
            config.executors[1].effective_tick_time(),
            Some(Duration::from_secs(60))
        );
        assert_eq!(config.executors[1].writer.as_ref().unwrap().kind, "in_memory");
        assert_eq!(config.executors[0].sources[0].id().to_string(), "dummy.one");
    }

    #[test]
    fn test_zero_executor_tick_means_global() {
        let yaml = "executors:\n  - collection: a\n    tick_time: 0s\n";
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.executors[0].tick_time, Some(Duration::ZERO));
        assert_eq!(config.executors[0].effective_tick_time(), None);
    }

    #[test]
    fn test_camel_case_tick_time_and_integer_seconds() {
        let yaml = "tickTime: 20\nexecutors:\n  - collection: a\n    tickTime: 5\n";
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.tick_time, Duration::from_secs(20));
        assert_eq!(
            config.executors[0].effective_tick_time(),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases = [
            "tick_time: 500ms\nexecutors:\n  - collection: a\n",
            "threads: 0\nexecutors:\n  - collection: a\n",
            "executors: []\n",
            "executors:\n  - collection: ''\n",
            "executors:\n  - collection: a\n    tick_time: 100ms\n",
            "executors:\n  - collection: a\n    sources:\n      - type: ''\n",
        ];
        for yaml in cases {
            let result = AppConfig::from_yaml(yaml);
            assert!(
                matches!(result, Err(ConfigError::ValidationError(_))),
                "expected validation error for {yaml:?}, got {result:?}"
            );
        }
    }

    #[test]
    fn test_env_expansion_in_values() {
        // SAFETY: This test runs in isolation and only modifies a test-specific variable.
        unsafe {
            std::env::set_var("POLLECT_TEST_COLLECTION", "from_env");
        }
        let yaml = "executors:\n  - collection: ${POLLECT_TEST_COLLECTION}\n    sources:\n      - type: dummy\n        value: ${POLLECT_TEST_VALUE_UNSET:-7}\n";
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.executors[0].collection, "from_env");
        assert_eq!(config.executors[0].sources[0].params["value"], "7");
        // SAFETY: Cleanup test variable.
        unsafe {
            std::env::remove_var("POLLECT_TEST_COLLECTION");
        }
    }

    #[test]
    fn test_missing_env_is_fatal() {
        let yaml = "executors:\n  - collection: ${POLLECT_TEST_DEFINITELY_UNSET}\n";
        assert!(matches!(
            AppConfig::from_yaml(yaml),
            Err(ConfigError::MissingEnv { .. })
        ));
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/configs/pollect.yml");
        let config = AppConfig::load(path).unwrap();
        assert_eq!(config.executors.len(), 2);
        assert_eq!(config.executors[0].sources[1].kind, "tcp");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pollect.yml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.executors[0].collection, "pollect");

        let missing = AppConfig::load(dir.path().join("missing.yml"));
        assert!(matches!(missing, Err(ConfigError::IoError(_))));
    }
}
