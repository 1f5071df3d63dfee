//! Log output of executor failures at the default `info` level.
//!
//! Probes and partial writes run on pool threads, so this binary installs a
//! global subscriber. Keep it to a single test.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use pollect::{Executor, Source, SourceError, SourceRef, Value, ValueSet, Writer, WriterError};
use tracing::Level;

/// Shared buffer the fmt layer writes into.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct HttpLike {
    name: &'static str,
    fail: bool,
    delay: Duration,
}

impl Source for HttpLike {
    fn kind(&self) -> &str {
        "http"
    }

    fn name(&self) -> Option<&str> {
        Some(self.name)
    }

    fn probe(&self) -> Result<Vec<ValueSet>, SourceError> {
        std::thread::sleep(self.delay);
        if self.fail {
            return Err(SourceError::Other("boom".to_string()));
        }
        let mut set = ValueSet::new().named(self.name);
        set.add(Value::new(1.0));
        Ok(vec![set])
    }
}

struct RejectingWriter;

impl Writer for RejectingWriter {
    fn kind(&self) -> &str {
        "rejecting"
    }

    fn supports_partial_write(&self) -> bool {
        true
    }

    fn write(&self, _data: &[ValueSet], _source: Option<&SourceRef>) -> Result<(), WriterError> {
        Err(WriterError::Rejected("full".to_string()))
    }
}

fn line_with<'a>(lines: &'a [String], message: &str) -> &'a str {
    lines
        .iter()
        .find(|l| l.contains(message))
        .unwrap_or_else(|| panic!("no line with {message:?} in {lines:#?}"))
}

#[test]
fn test_failure_logs_name_the_source_at_info() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let executor = Executor::builder("pollect")
        .slow_probe_threshold(Duration::from_millis(10))
        .source(HttpLike {
            name: "dev_core",
            fail: true,
            delay: Duration::from_millis(50),
        })
        .source(HttpLike {
            name: "dev_edge",
            fail: false,
            delay: Duration::ZERO,
        })
        .writer(RejectingWriter)
        .build()
        .unwrap();

    executor.execute();
    executor.shutdown();

    let lines = captured.lines();
    let probe_error = line_with(&lines, "Error while probing source");
    assert!(probe_error.contains("http.dev_core"), "{probe_error}");
    assert!(probe_error.contains("boom"), "{probe_error}");

    let slow = line_with(&lines, "Probe took longer than");
    assert!(slow.contains("http.dev_core"), "{slow}");

    let write_error = line_with(&lines, "Error while writing");
    assert!(write_error.contains("http.dev_edge"), "{write_error}");
    assert!(write_error.contains("rejecting"), "{write_error}");
}
