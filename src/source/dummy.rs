//! Static value source.
//!
//! Returns one configured value per probe. Useful for dry runs, smoke tests
//! and exercising the scheduler with artificial delays or failures.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::source::{Source, SourceError, SourceSpec};
use crate::value::{Value, ValueSet};

/// Source type identifier.
pub const KIND: &str = "dummy";

/// Accepts `1`, `1.5` or `"1.5"`; env-expanded values often arrive quoted.
fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Configuration for the dummy source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DummyConfig {
    /// Value to report (default: 0).
    #[serde(default, deserialize_with = "number_or_string")]
    pub value: f64,
    /// Delay before each probe returns.
    #[serde(default, with = "humantime_serde")]
    pub sleep: Option<Duration>,
    /// Fail every probe instead of returning data.
    #[serde(default)]
    pub fail: bool,
}

/// Dummy source.
#[derive(Debug)]
pub struct DummySource {
    name: Option<String>,
    config: DummyConfig,
}

impl DummySource {
    /// Create a dummy source.
    pub fn new(name: Option<String>, config: DummyConfig) -> Self {
        Self { name, config }
    }

    /// Build from a configuration spec.
    pub fn from_spec(spec: &SourceSpec) -> Result<Self, SourceError> {
        Ok(Self::new(spec.name.clone(), spec.parse_params()?))
    }
}

impl Source for DummySource {
    fn kind(&self) -> &str {
        KIND
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn probe(&self) -> Result<Vec<ValueSet>, SourceError> {
        if let Some(delay) = self.config.sleep {
            std::thread::sleep(delay);
        }
        if self.config.fail {
            return Err(SourceError::Other("configured to fail".to_string()));
        }

        let mut set = ValueSet::new().named(self.id().to_string());
        set.add(Value::new(self.config.value));
        Ok(vec![set])
    }
}
