//! Configuration errors and parsing utilities.

use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};
use thiserror::Error;

use crate::execution::PoolError;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),

    /// A referenced environment variable is unset and has no default.
    #[error("environment variable '{var}' is not set and has no default")]
    MissingEnv { var: String },

    /// No factory registered for the source type.
    #[error("unknown source type: '{0}'")]
    UnknownSource(String),

    /// No factory registered for the writer type.
    #[error("unknown writer type: '{0}'")]
    UnknownWriter(String),

    /// Writers of one executor disagree on partial-write support.
    #[error("executor '{collection}': all writers must agree on partial write support")]
    MixedPartialWrite { collection: String },

    /// Executor has neither a local nor a global writer.
    #[error("executor '{collection}' has no writer")]
    NoWriter { collection: String },

    /// Source could not be created or set up.
    #[error("invalid source '{kind}': {reason}")]
    InvalidSource { kind: String, reason: String },

    /// Writer could not be created or started.
    #[error("invalid writer '{kind}': {reason}")]
    InvalidWriter { kind: String, reason: String },

    /// Executor worker pool could not be created.
    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),
}

/// Parse duration string using humantime.
///
/// Supports various formats: `30s`, `1m`, `5m30s`, `1h`, `100ms`, etc. A bare
/// integer is read as seconds.
///
/// # Examples
///
/// ```
/// use pollect::config::parse_duration;
///
/// assert_eq!(parse_duration("30s").unwrap().as_secs(), 30);
/// assert_eq!(parse_duration("1m").unwrap().as_secs(), 60);
/// assert_eq!(parse_duration("15").unwrap().as_secs(), 15);
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("duration string is empty".to_string());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

impl RawDuration {
    fn into_duration<E: serde::de::Error>(self) -> Result<Duration, E> {
        match self {
            Self::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Self::Text(text) => parse_duration(&text).map_err(E::custom),
        }
    }
}

/// Serde adapter accepting `30s`-style strings or integer seconds.
pub(crate) mod duration {
    use super::*;

    pub(crate) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        RawDuration::deserialize(deserializer)?.into_duration()
    }
}

/// Optional variant of [`duration`].
pub(crate) mod option_duration {
    use super::*;

    pub(crate) fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.collect_str(&humantime::format_duration(*d)),
            None => serializer.serialize_none(),
        }
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<RawDuration>::deserialize(deserializer)?
            .map(RawDuration::into_duration)
            .transpose()
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}`, `${VAR:-default}` and `$$` for a literal `$`.
///
/// # Errors
/// Returns `ConfigError::MissingEnv` for an unset variable without default.
pub fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let regex = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\$|\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("failed to compile env var regex")
    });

    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for caps in regex.captures_iter(input) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&input[last..whole.start()]);
        last = whole.end();

        let Some(var) = caps.get(1) else {
            // `$$`
            out.push('$');
            continue;
        };
        match (std::env::var(var.as_str()), caps.get(2)) {
            (Ok(value), _) => out.push_str(&value),
            (Err(_), Some(default)) => out.push_str(default.as_str()),
            (Err(_), None) => {
                return Err(ConfigError::MissingEnv {
                    var: var.as_str().to_string(),
                });
            }
        }
    }
    out.push_str(&input[last..]);
    Ok(out)
}

/// Expand every string scalar of a parsed YAML document in place.
pub(crate) fn expand_yaml(value: &mut serde_yaml::Value) -> Result<(), ConfigError> {
    match value {
        serde_yaml::Value::String(s) => {
            if s.contains('$') {
                *s = expand_env_vars(s)?;
            }
        }
        serde_yaml::Value::Sequence(items) => {
            for item in items {
                expand_yaml(item)?;
            }
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                expand_yaml(item)?;
            }
        }
        serde_yaml::Value::Tagged(tagged) => expand_yaml(&mut tagged.value)?,
        serde_yaml::Value::Null | serde_yaml::Value::Bool(_) | serde_yaml::Value::Number(_) => {}
    }
    Ok(())
}
