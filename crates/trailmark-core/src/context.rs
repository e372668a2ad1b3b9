//! Correlation of all writes performed by one top-level operation.
//!
//! A [`WriteContext`] is created by the host for each top-level save and
//! threaded through every nested write it triggers. The first
//! `before_write` notification assigns it a [`TransactionId`] and an empty
//! [`TransactionQueue`]; nested writes find both already present and reuse
//! them. Contexts are never shared between unrelated operations, so no
//! locking is involved.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::{Timestamp, Uuid};

use crate::event::AuditEvent;

/// Correlation id shared by every event of one top-level write operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Generates a new unique id.
    #[must_use]
    pub fn new() -> Self {
        let ts = Timestamp::now(uuid::NoContext);
        Self(Uuid::new_v7(ts))
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the record an event was produced for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKey {
    source: String,
    primary_key: Value,
}

impl RecordKey {
    /// Creates a key from a table name and primary key value.
    #[must_use]
    pub fn new(source: &str, primary_key: Value) -> Self {
        Self {
            source: source.to_string(),
            primary_key,
        }
    }

    /// Returns the table name.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the primary key value.
    #[must_use]
    pub const fn primary_key(&self) -> &Value {
        &self.primary_key
    }
}

/// Insertion-ordered events pending for one write operation.
///
/// Saving the same record twice queues two events.
#[derive(Debug, Clone, Default)]
pub struct TransactionQueue {
    entries: Vec<(RecordKey, AuditEvent)>,
}

impl TransactionQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event produced for `owner`.
    pub fn push(&mut self, owner: RecordKey, event: AuditEvent) {
        self.entries.push((owner, event));
    }

    /// Returns the number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the events queued for one record, oldest first.
    #[must_use]
    pub fn events_for(&self, owner: &RecordKey) -> Vec<&AuditEvent> {
        self.entries
            .iter()
            .filter(|(key, _)| key == owner)
            .map(|(_, event)| event)
            .collect()
    }

    /// Iterates over queued events in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &AuditEvent> {
        self.entries.iter().map(|(_, event)| event)
    }

    /// Consumes the queue, yielding events in insertion order.
    #[must_use]
    pub fn into_events(self) -> Vec<AuditEvent> {
        self.entries.into_iter().map(|(_, event)| event).collect()
    }
}

/// Per-operation bag the host threads through nested writes.
#[derive(Debug, Default)]
pub struct WriteContext {
    transaction_id: Option<TransactionId>,
    queue: Option<TransactionQueue>,
    cascade_source: Option<String>,
}

impl WriteContext {
    /// Creates a context with no audit state attached.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a transaction id and a queue if either is missing.
    ///
    /// Idempotent: existing state is never reset.
    pub fn ensure(&mut self) -> TransactionId {
        let transaction = *self.transaction_id.get_or_insert_with(TransactionId::new);
        if self.queue.is_none() {
            debug!(transaction_id = %transaction, "Opening audit queue");
            self.queue = Some(TransactionQueue::new());
        }
        transaction
    }

    /// Returns the transaction id, if one was assigned.
    #[must_use]
    pub const fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction_id
    }

    /// Returns `true` while a queue is attached.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.queue.is_some()
    }

    /// Returns the attached queue.
    #[must_use]
    pub const fn queue(&self) -> Option<&TransactionQueue> {
        self.queue.as_ref()
    }

    /// Appends an event to the attached queue.
    ///
    /// Returns `false`, dropping the event, when no queue is attached.
    pub fn enqueue(&mut self, owner: RecordKey, event: AuditEvent) -> bool {
        let Some(queue) = self.queue.as_mut() else {
            debug!(source = owner.source(), "No audit queue attached, dropping event");
            return false;
        };
        debug!(
            transaction_id = %event.transaction_id(),
            source = owner.source(),
            kind = %event.kind(),
            position = queue.len(),
            "Queued audit event"
        );
        queue.push(owner, event);
        true
    }

    /// Detaches the queue and returns its events in insertion order.
    ///
    /// Yields nothing when no queue is attached, including on a second drain.
    pub fn drain(&mut self) -> Vec<AuditEvent> {
        self.queue
            .take()
            .map(TransactionQueue::into_events)
            .unwrap_or_default()
    }

    /// Returns the table that initiated the current cascade, if any.
    #[must_use]
    pub fn cascade_source(&self) -> Option<&str> {
        self.cascade_source.as_deref()
    }

    /// Runs `f` with `source` recorded as the cascade origin.
    ///
    /// Nested cascades keep the outermost source.
    pub fn cascade<R>(&mut self, source: &str, f: impl FnOnce(&mut Self) -> R) -> R {
        let opened = self.cascade_source.is_none();
        if opened {
            self.cascade_source = Some(source.to_string());
        }
        let result = f(self);
        if opened {
            self.cascade_source = None;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ChangeSet, FieldMap};
    use serde_json::json;

    fn event(transaction: TransactionId, source: &str, id: i64) -> AuditEvent {
        let mut changed = FieldMap::new();
        changed.insert("id".to_string(), json!(id));
        let changes = ChangeSet::created(changed).unwrap();
        AuditEvent::create(transaction, json!(id), source, changes)
    }

    #[test]
    fn test_transaction_ids_are_unique() {
        assert_ne!(TransactionId::new(), TransactionId::new());
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let mut ctx = WriteContext::new();
        assert!(!ctx.is_active());

        let first = ctx.ensure();
        ctx.enqueue(RecordKey::new("articles", json!(1)), event(first, "articles", 1));
        let second = ctx.ensure();

        assert_eq!(first, second);
        assert_eq!(ctx.queue().map(TransactionQueue::len), Some(1));
    }

    #[test]
    fn test_enqueue_without_queue_is_dropped() {
        let mut ctx = WriteContext::new();
        let queued = ctx.enqueue(
            RecordKey::new("articles", json!(1)),
            event(TransactionId::new(), "articles", 1),
        );
        assert!(!queued);
        assert!(ctx.drain().is_empty());
    }

    #[test]
    fn test_drain_preserves_order_and_detaches() {
        let mut ctx = WriteContext::new();
        let transaction = ctx.ensure();
        for (source, id) in [("comments", 7), ("comments", 8), ("articles", 1)] {
            ctx.enqueue(RecordKey::new(source, json!(id)), event(transaction, source, id));
        }

        let events = ctx.drain();
        let order: Vec<_> = events.iter().map(|e| e.id().clone()).collect();
        assert_eq!(order, vec![json!(7), json!(8), json!(1)]);
        assert!(!ctx.is_active());
        assert!(ctx.drain().is_empty());
        assert_eq!(ctx.transaction_id(), Some(transaction));
    }

    #[test]
    fn test_same_record_twice_queues_twice() {
        let mut ctx = WriteContext::new();
        let transaction = ctx.ensure();
        let key = RecordKey::new("articles", json!(1));
        ctx.enqueue(key.clone(), event(transaction, "articles", 1));
        ctx.enqueue(key.clone(), event(transaction, "articles", 1));
        ctx.enqueue(
            RecordKey::new("authors", json!(1)),
            event(transaction, "authors", 1),
        );

        let queue = ctx.queue().unwrap();
        assert_eq!(queue.events_for(&key).len(), 2);
        assert_eq!(queue.iter().count(), 3);
    }

    #[test]
    fn test_cascade_keeps_outermost_source() {
        let mut ctx = WriteContext::new();
        assert_eq!(ctx.cascade_source(), None);

        let inner = ctx.cascade("articles", |ctx| {
            ctx.cascade("tags", |ctx| ctx.cascade_source().map(ToString::to_string))
        });

        assert_eq!(inner.as_deref(), Some("articles"));
        assert_eq!(ctx.cascade_source(), None);
    }
}
