//! TCP port probe source.
//!
//! Measures TCP connection latency to a target address.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::source::{Source, SourceError, SourceSpec};
use crate::value::{Value, ValueSet};

/// Source type identifier.
pub const KIND: &str = "tcp";

/// Default connection timeout (3 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Latency value indicating probe failure (connection refused, timeout, etc.).
/// Using -1.0 to distinguish from valid 0ms latency.
const FAILURE_LATENCY_MS: f64 = -1.0;

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// Configuration for TCP port probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Target host (IP address or hostname).
    pub host: String,
    /// Target port.
    pub port: u16,
    /// Probe timeout (default: 3s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl TcpConfig {
    /// Create a new TCP probe configuration.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the probe timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// TCP port probe source.
///
/// Reports connection latency in milliseconds and an `up` flag labelled by
/// target. An unreachable target is a valid observation, not an error.
#[derive(Debug)]
pub struct TcpSource {
    name: Option<String>,
    config: TcpConfig,
}

impl TcpSource {
    /// Create a new TCP source.
    pub fn new(name: Option<String>, config: TcpConfig) -> Self {
        Self { name, config }
    }

    /// Build from a configuration spec.
    pub fn from_spec(spec: &SourceSpec) -> Result<Self, SourceError> {
        let config: TcpConfig = spec.parse_params()?;
        if config.host.is_empty() {
            return Err(SourceError::Config(format!("{}: host is empty", spec.id())));
        }
        Ok(Self::new(spec.name.clone(), config))
    }

    fn connect(&self, target: &str) -> Result<Duration, SourceError> {
        let addr = target
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| SourceError::Other(format!("no address for {target}")))?;

        let start = Instant::now();
        TcpStream::connect_timeout(&addr, self.config.timeout).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                SourceError::Timeout
            } else {
                SourceError::Io(e)
            }
        })?;
        Ok(start.elapsed())
    }
}

impl Source for TcpSource {
    fn kind(&self) -> &str {
        KIND
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn probe(&self) -> Result<Vec<ValueSet>, SourceError> {
        let target = self.config.target();

        let (latency_ms, success) = match self.connect(&target) {
            Ok(elapsed) => {
                let ms = elapsed.as_secs_f64() * 1000.0;
                tracing::debug!(source = %self.id(), target = %target, latency_ms = ms, "TCP probe successful");
                (ms, true)
            }
            Err(SourceError::Timeout) => {
                tracing::warn!(source = %self.id(), target = %target, timeout_ms = self.config.timeout.as_millis(), "TCP probe timed out");
                (FAILURE_LATENCY_MS, false)
            }
            Err(e) => {
                tracing::warn!(source = %self.id(), target = %target, error = %e, "TCP probe failed");
                (FAILURE_LATENCY_MS, false)
            }
        };

        let mut set = ValueSet::with_labels(["target"]).named(self.id().to_string());
        set.add(
            Value::new(latency_ms)
                .with_name("latency_ms")
                .with_labels([target.clone()]),
        );
        set.add(Value::new(success).with_name("up").with_labels([target]));
        Ok(vec![set])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;
    use std::net::TcpListener;

    #[test]
    fn test_tcp_config_defaults() {
        let config = TcpConfig::new("127.0.0.1", 6379);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 6379);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_tcp_from_spec_requires_port() {
        let spec = SourceSpec::new(KIND).with_param("host", "127.0.0.1");
        assert!(TcpSource::from_spec(&spec).is_err());
    }

    #[test]
    fn test_tcp_source_success() {
        let listener = match TcpListener::bind("127.0.0.1:0") {
            Ok(l) => l,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                // Some sandboxed environments disallow binding; skip the test.
                return;
            }
            Err(e) => panic!("Failed to bind test listener: {e}"),
        };
        let addr = listener.local_addr().unwrap();

        let config = TcpConfig::new(addr.ip().to_string(), addr.port())
            .with_timeout(Duration::from_secs(1));
        let source = TcpSource::new(Some("local".to_string()), config);

        let sets = source.probe().unwrap();
        assert_eq!(sets[0].name, "tcp.local");
        assert!(sets[0].validate().is_ok());
        let up = &sets[0].values[1];
        assert_eq!(up.name.as_deref(), Some("up"));
        assert_eq!(up.value, 1.0);
        assert!(sets[0].values[0].value >= 0.0);
    }

    #[test]
    fn test_tcp_source_connection_refused() {
        // Bind then drop to obtain a port with no listener.
        let port = match TcpListener::bind("127.0.0.1:0") {
            Ok(l) => l.local_addr().unwrap().port(),
            Err(_) => return,
        };

        let config = TcpConfig::new("127.0.0.1", port).with_timeout(Duration::from_millis(500));
        let source = TcpSource::new(None, config);

        // Probe succeeds and records the failure as data.
        let sets = source.probe().unwrap();
        assert_eq!(sets[0].values[0].value, FAILURE_LATENCY_MS);
        assert_eq!(sets[0].values[1].value, 0.0);
    }
}
