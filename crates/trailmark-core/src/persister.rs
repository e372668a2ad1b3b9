//! Persister trait and stock implementations.

use std::fmt::Debug;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::info;

use crate::error::PersistError;
use crate::event::AuditEvent;

/// Sink receiving the committed batch of a write operation.
///
/// Called at most once per committed operation, with a non-empty batch in
/// write order. Retrying is up to the implementation.
pub trait Persister: Send + Sync + Debug {
    /// Records a batch of events.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch could not be recorded.
    fn log_events(&self, events: &[AuditEvent]) -> Result<(), PersistError>;

    /// Returns the persister name for identification.
    fn name(&self) -> &'static str;
}

/// Persister that emits each event through `tracing`.
#[derive(Debug, Default)]
pub struct TracingPersister;

impl TracingPersister {
    /// Creates a new tracing persister.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Persister for TracingPersister {
    fn log_events(&self, events: &[AuditEvent]) -> Result<(), PersistError> {
        for event in events {
            let json = serde_json::to_string(event)?;
            info!(
                event_type = event.event_type(),
                transaction_id = %event.transaction_id(),
                source = event.source_name(),
                audit_event = %json,
                "Audit event"
            );
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}

/// In-memory persister for testing.
///
/// Keeps every delivered batch. A failing instance rejects every batch
/// without recording it.
#[derive(Debug, Default)]
pub struct InMemoryPersister {
    batches: Mutex<Vec<Vec<AuditEvent>>>,
    failure: Option<String>,
}

impl InMemoryPersister {
    /// Creates a new in-memory persister.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a persister that rejects every batch with `message`.
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            failure: Some(message.to_string()),
        }
    }

    /// Returns every delivered batch.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<AuditEvent>> {
        self.batches.lock().clone()
    }

    /// Returns every delivered event, flattened in delivery order.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    /// Returns the number of successful `log_events` calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.batches.lock().len()
    }

    /// Clears all recorded batches.
    pub fn clear(&self) {
        self.batches.lock().clear();
    }
}

impl Persister for InMemoryPersister {
    fn log_events(&self, events: &[AuditEvent]) -> Result<(), PersistError> {
        if let Some(message) = &self.failure {
            return Err(PersistError::Backend(message.clone()));
        }
        self.batches.lock().push(events.to_vec());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

/// Appends events to a line-delimited JSON file.
///
/// Each event is one line; the file is flushed once per batch.
#[derive(Debug)]
pub struct JsonLinesPersister {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLinesPersister {
    /// Creates a persister writing to `path`. The file is created on first use.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Returns the path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persister for JsonLinesPersister {
    fn log_events(&self, events: &[AuditEvent]) -> Result<(), PersistError> {
        let mut lines = Vec::with_capacity(events.len());
        for event in events {
            lines.push(serde_json::to_string(event)?);
        }

        let _guard = self.lock.lock();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        for line in &lines {
            writeln!(writer, "{line}")?;
        }
        writer.flush()?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "json_lines"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TransactionId;
    use crate::event::{ChangeSet, FieldMap};
    use serde_json::json;

    fn sample_batch() -> Vec<AuditEvent> {
        let transaction = TransactionId::new();
        let mut changed = FieldMap::new();
        changed.insert("name".to_string(), json!("Jose"));
        let author = AuditEvent::create(
            transaction,
            json!(5),
            "authors",
            ChangeSet::created(changed).unwrap(),
        );
        let article = AuditEvent::delete(transaction, json!(1), "articles");
        vec![author, article]
    }

    #[test]
    fn test_in_memory_records_batches() {
        let persister = InMemoryPersister::new();
        persister.log_events(&sample_batch()).unwrap();

        assert_eq!(persister.call_count(), 1);
        assert_eq!(persister.events().len(), 2);
        assert_eq!(persister.batches()[0][0].source_name(), "authors");

        persister.clear();
        assert_eq!(persister.call_count(), 0);
    }

    #[test]
    fn test_failing_in_memory_rejects() {
        let persister = InMemoryPersister::failing("index unavailable");
        let err = persister.log_events(&sample_batch()).unwrap_err();

        assert!(matches!(err, PersistError::Backend(ref m) if m == "index unavailable"));
        assert_eq!(persister.call_count(), 0);
    }

    #[test]
    fn test_tracing_persister() {
        let persister = TracingPersister::new();

        // Should not panic
        persister.log_events(&sample_batch()).unwrap();
        assert_eq!(persister.name(), "tracing");
    }

    #[test]
    fn test_json_lines_appends_one_line_per_event() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let persister = JsonLinesPersister::new(temp_dir.path().join("audit.log"));

        persister.log_events(&sample_batch()).unwrap();
        persister.log_events(&sample_batch()[..1]).unwrap();

        let content = std::fs::read_to_string(persister.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);

        let first: AuditEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.source_name(), "authors");
        assert_eq!(first.changed()["name"], json!("Jose"));
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["type"], json!("delete"));
    }

    #[test]
    fn test_json_lines_reports_io_errors() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let persister = JsonLinesPersister::new(temp_dir.path().join("missing").join("audit.log"));

        let err = persister.log_events(&sample_batch()).unwrap_err();
        assert!(matches!(err, PersistError::Io(_)));
    }
}
