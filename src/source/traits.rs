//! Core source trait and identity types.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AppConfig;
use crate::value::ValueSet;

/// Errors a source can report from `setup`, `probe` or `shutdown`.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network or file I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout elapsed.
    #[error("timeout elapsed")]
    Timeout,

    /// HTTP client error.
    #[error("http error: {0}")]
    Http(String),

    /// Invalid source configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

/// Identity of a source: its type and optional instance name.
///
/// Rendered as `type` or `type.name`; used as the value set name suffix and
/// in log output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceId {
    kind: String,
    name: Option<String>,
}

impl SourceId {
    /// Create an identity.
    pub fn new(kind: impl Into<String>, name: Option<String>) -> Self {
        Self {
            kind: kind.into(),
            name,
        }
    }

    /// Source type.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Instance name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}.{}", self.kind, name),
            None => f.write_str(&self.kind),
        }
    }
}

/// Opaque per-source token handed to writers in partial mode.
///
/// Two references compare equal only if they were issued for the same
/// configured source, so writers can key retraction state on them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRef {
    id: uuid::Uuid,
    label: Arc<str>,
}

impl SourceRef {
    pub(crate) fn issue(source: &SourceId) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            label: source.to_string().into(),
        }
    }

    /// Unique token value.
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Identity of the source this reference was issued for.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Declarative source definition from configuration.
///
/// `type` selects the factory, `name` distinguishes instances; every other
/// key is passed through to the factory as parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Registered source type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Optional instance name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Type-specific parameters.
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl SourceSpec {
    /// Create a spec without parameters.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: None,
            params: serde_json::Map::new(),
        }
    }

    /// Set the instance name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Identity derived from type and name.
    pub fn id(&self) -> SourceId {
        SourceId::new(self.kind.clone(), self.name.clone())
    }

    /// Deserialize the parameters into a typed config.
    pub fn parse_params<T: DeserializeOwned>(&self) -> Result<T, SourceError> {
        serde_json::from_value(serde_json::Value::Object(self.params.clone()))
            .map_err(|e| SourceError::Config(format!("{}: {}", self.id(), e)))
    }
}

/// Capability implemented by every data source.
///
/// Sources are probed from worker pool threads, possibly concurrently with
/// their own `shutdown`, so they take `&self` and synchronize internally.
///
/// # Error Handling
///
/// `probe` failures never abort a collection cycle: the executor logs them
/// and treats the source as having returned no data for that cycle.
pub trait Source: Send + Sync + 'static {
    /// Source type, e.g. `"http"`.
    fn kind(&self) -> &str;

    /// Instance name, if configured.
    fn name(&self) -> Option<&str> {
        None
    }

    /// Combined identity.
    fn id(&self) -> SourceId {
        SourceId::new(self.kind(), self.name().map(str::to_owned))
    }

    /// One-time initialization before the first probe.
    fn setup(&mut self, _global: &AppConfig) -> Result<(), SourceError> {
        Ok(())
    }

    /// Collect the current measurements.
    fn probe(&self) -> Result<Vec<ValueSet>, SourceError>;

    /// Release background resources.
    fn shutdown(&self) -> Result<(), SourceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id_display() {
        assert_eq!(SourceId::new("http", None).to_string(), "http");
        assert_eq!(
            SourceId::new("http", Some("dev_core".to_string())).to_string(),
            "http.dev_core"
        );
    }

    #[test]
    fn test_source_refs_are_unique() {
        let id = SourceId::new("dummy", None);
        let a = SourceRef::issue(&id);
        let b = SourceRef::issue(&id);
        assert_ne!(a, b);
        assert_eq!(a.clone(), a);
        assert_eq!(a.label(), "dummy");
    }

    #[test]
    fn test_spec_deserializes_flattened_params() {
        let spec: SourceSpec =
            serde_yaml::from_str("type: tcp\nname: redis\nhost: 127.0.0.1\nport: 6379\n").unwrap();
        assert_eq!(spec.kind, "tcp");
        assert_eq!(spec.name.as_deref(), Some("redis"));
        assert_eq!(spec.params["port"], serde_json::json!(6379));
        assert_eq!(spec.id().to_string(), "tcp.redis");
    }

    #[test]
    fn test_parse_params_reports_identity() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Needs {
            port: u16,
        }

        let spec = SourceSpec::new("tcp").with_name("x");
        let err = spec.parse_params::<Needs>().unwrap_err();
        assert!(err.to_string().contains("tcp.x"));
    }
}
