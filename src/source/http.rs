//! HTTP endpoint probe source.
//!
//! Measures request latency for one or more URLs.

use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::source::{Source, SourceError, SourceSpec};
use crate::value::{Value, ValueSet};

/// Source type identifier.
pub const KIND: &str = "http";

/// Default request timeout (10 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default expected HTTP status code.
const DEFAULT_EXPECTED_STATUS: u16 = 200;

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_expected_status() -> u16 {
    DEFAULT_EXPECTED_STATUS
}

/// One URL or a list of URLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Urls {
    One(String),
    Many(Vec<String>),
}

impl Urls {
    fn as_slice(&self) -> &[String] {
        match self {
            Self::One(url) => std::slice::from_ref(url),
            Self::Many(urls) => urls,
        }
    }
}

/// Configuration for HTTP endpoint probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Target URL(s).
    pub url: Urls,
    /// Request timeout (default: 10s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Expected HTTP status code (default: 200).
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
}

impl HttpConfig {
    /// Create a configuration for a single URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Urls::One(url.into()),
            timeout: DEFAULT_TIMEOUT,
            expected_status: DEFAULT_EXPECTED_STATUS,
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validate every URL.
    pub fn validate(&self) -> Result<(), SourceError> {
        let urls = self.url.as_slice();
        if urls.is_empty() {
            return Err(SourceError::Config("no url configured".to_string()));
        }
        for url in urls {
            url::Url::parse(url)
                .map_err(|e| SourceError::Config(format!("invalid URL '{url}': {e}")))?;
        }
        Ok(())
    }
}

/// HTTP endpoint probe source.
///
/// Reports latency in milliseconds per URL. A failed request or an
/// unexpected status reports the configured timeout instead.
pub struct HttpSource {
    name: Option<String>,
    config: HttpConfig,
    client: Client,
}

impl HttpSource {
    /// Create a new HTTP source.
    ///
    /// # Errors
    /// Returns `SourceError::Config` for invalid URLs or if the HTTP client
    /// cannot be built.
    pub fn new(name: Option<String>, config: HttpConfig) -> Result<Self, SourceError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SourceError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            name,
            config,
            client,
        })
    }

    /// Build from a configuration spec.
    pub fn from_spec(spec: &SourceSpec) -> Result<Self, SourceError> {
        Self::new(spec.name.clone(), spec.parse_params()?)
    }

    fn request(&self, url: &str) -> Result<Duration, SourceError> {
        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| SourceError::Http(e.to_string()))?;
        let elapsed = start.elapsed();

        let status = response.status().as_u16();
        if status != self.config.expected_status {
            return Err(SourceError::Http(format!(
                "status {status}, expected {}",
                self.config.expected_status
            )));
        }
        Ok(elapsed)
    }
}

impl std::fmt::Debug for HttpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSource")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Source for HttpSource {
    fn kind(&self) -> &str {
        KIND
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn probe(&self) -> Result<Vec<ValueSet>, SourceError> {
        let mut set = ValueSet::with_labels(["url"]).named(self.id().to_string());

        for url in self.config.url.as_slice() {
            let latency_ms = match self.request(url) {
                Ok(elapsed) => {
                    let ms = elapsed.as_secs_f64() * 1000.0;
                    tracing::debug!(source = %self.id(), url = %url, latency_ms = ms, "HTTP probe successful");
                    ms
                }
                Err(e) => {
                    tracing::warn!(source = %self.id(), url = %url, error = %e, "HTTP probe failed");
                    self.config.timeout.as_secs_f64() * 1000.0
                }
            };
            set.add(Value::new(latency_ms).with_labels([url.as_str()]));
        }

        Ok(vec![set])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_config_single_or_many() {
        let one: HttpConfig = serde_yaml::from_str("url: https://example.com\n").unwrap();
        assert_eq!(one.url.as_slice(), ["https://example.com"]);
        assert_eq!(one.timeout, DEFAULT_TIMEOUT);
        assert_eq!(one.expected_status, DEFAULT_EXPECTED_STATUS);

        let many: HttpConfig =
            serde_yaml::from_str("url: [https://a.example, https://b.example]\ntimeout: 1s\n")
                .unwrap();
        assert_eq!(many.url.as_slice().len(), 2);
        assert_eq!(many.timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_http_invalid_url_rejected() {
        let result = HttpSource::new(None, HttpConfig::new("not a url"));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("invalid URL"));
    }

    #[test]
    fn test_http_unreachable_reports_timeout() {
        // Port 9 on localhost is almost never served; connection is refused fast.
        let config = HttpConfig::new("http://127.0.0.1:9/").with_timeout(Duration::from_millis(500));
        let source = HttpSource::new(Some("down".to_string()), config).unwrap();

        let sets = source.probe().unwrap();
        assert_eq!(sets[0].name, "http.down");
        assert_eq!(sets[0].values.len(), 1);
        assert_eq!(sets[0].values[0].value, 500.0);
        assert_eq!(sets[0].values[0].label_values, ["http://127.0.0.1:9/"]);
    }
}
