//! Logging-only writer used by `--dry-run`.

use crate::source::SourceRef;
use crate::value::ValueSet;
use crate::writer::{Writer, WriterError};

/// Writer type identifier.
pub const KIND: &str = "dry_run";

/// Logs what would have been written instead of exporting it.
///
/// Accepts partial writes so each source shows up as soon as it completes.
#[derive(Debug, Clone)]
pub struct DryRunWriter {
    replaces: String,
}

impl DryRunWriter {
    /// Create a dry-run writer standing in for the writer type `replaces`.
    pub fn new(replaces: impl Into<String>) -> Self {
        Self {
            replaces: replaces.into(),
        }
    }

    /// Writer type this instance stands in for.
    pub fn replaces(&self) -> &str {
        &self.replaces
    }
}

impl Writer for DryRunWriter {
    fn kind(&self) -> &str {
        KIND
    }

    fn supports_partial_write(&self) -> bool {
        true
    }

    fn write(&self, data: &[ValueSet], source: Option<&SourceRef>) -> Result<(), WriterError> {
        let source = source.map(SourceRef::label).unwrap_or("-");
        for set in data {
            tracing::info!(writer = %self.replaces, source, time = set.time, "Would write {}", set);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_dry_run_accepts_everything() {
        let writer = DryRunWriter::new("in_memory");
        let mut set = ValueSet::new().named("pollect");
        set.add(Value::new(1.0));

        assert!(writer.supports_partial_write());
        assert!(writer.write(&[set], None).is_ok());
        assert_eq!(writer.replaces(), "in_memory");
    }
}
