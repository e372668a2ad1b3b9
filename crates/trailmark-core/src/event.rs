//! Audit event definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::TransactionId;

/// Ordered mapping from field name to a dynamically typed value.
pub type FieldMap = serde_json::Map<String, Value>;

/// Kind of change an audit event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A record was inserted
    Create,
    /// An existing record was modified
    Update,
    /// A record was removed
    Delete,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Non-empty set of field changes for a single record.
///
/// `changed` is never empty. For updates `original` has exactly the keys of
/// `changed`, in the same order; for creations it is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    changed: FieldMap,
    original: FieldMap,
}

impl ChangeSet {
    /// Builds the change set of a newly created record.
    ///
    /// Returns `None` when `changed` is empty.
    #[must_use]
    pub fn created(changed: FieldMap) -> Option<Self> {
        if changed.is_empty() {
            return None;
        }
        Some(Self {
            changed,
            original: FieldMap::new(),
        })
    }

    /// Builds the change set of an updated record.
    ///
    /// `original` is re-keyed on `changed`: extra keys are dropped and keys
    /// with no previous value are recorded as `null`. Returns `None` when
    /// `changed` is empty.
    #[must_use]
    pub fn updated(changed: FieldMap, mut original: FieldMap) -> Option<Self> {
        if changed.is_empty() {
            return None;
        }
        let original = changed
            .keys()
            .map(|field| {
                let previous = original.remove(field).unwrap_or(Value::Null);
                (field.clone(), previous)
            })
            .collect();
        Some(Self { changed, original })
    }

    /// Removes the given fields from both maps.
    ///
    /// Returns `None` if nothing is left.
    #[must_use]
    pub fn without<'a>(mut self, fields: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        for field in fields {
            self.changed.remove(field);
            self.original.remove(field);
        }
        if self.changed.is_empty() {
            None
        } else {
            Some(self)
        }
    }

    /// New values keyed by field name.
    #[must_use]
    pub const fn changed(&self) -> &FieldMap {
        &self.changed
    }

    /// Previous values keyed by field name.
    #[must_use]
    pub const fn original(&self) -> &FieldMap {
        &self.original
    }

    /// Number of changed fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changed.len()
    }

    /// Returns `true` if no field changed. Never the case once constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    /// Splits the set into `(changed, original)`.
    #[must_use]
    pub fn into_parts(self) -> (FieldMap, FieldMap) {
        (self.changed, self.original)
    }
}

/// A single audit-worthy change to a persistent record.
///
/// The change payload is fixed at construction; only the `meta` map may be
/// extended afterwards, by [`BeforeLog`](crate::BeforeLog) listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    #[serde(rename = "type")]
    kind: EventKind,

    #[serde(rename = "transaction")]
    transaction_id: TransactionId,

    #[serde(rename = "primary_key")]
    id: Value,

    #[serde(rename = "source")]
    source_name: String,

    #[serde(
        rename = "parent_source",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    parent_source_name: Option<String>,

    changed: FieldMap,

    original: FieldMap,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    meta: FieldMap,

    #[serde(rename = "@timestamp")]
    timestamp: DateTime<Utc>,
}

impl AuditEvent {
    fn new(
        kind: EventKind,
        transaction_id: TransactionId,
        id: Value,
        source_name: &str,
        changed: FieldMap,
        original: FieldMap,
    ) -> Self {
        Self {
            kind,
            transaction_id,
            id,
            source_name: source_name.to_string(),
            parent_source_name: None,
            changed,
            original,
            meta: FieldMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Creates an event for a newly inserted record.
    ///
    /// Any previous values carried by `changes` are discarded.
    #[must_use]
    pub fn create(
        transaction_id: TransactionId,
        id: Value,
        source_name: &str,
        changes: ChangeSet,
    ) -> Self {
        let (changed, _) = changes.into_parts();
        Self::new(
            EventKind::Create,
            transaction_id,
            id,
            source_name,
            changed,
            FieldMap::new(),
        )
    }

    /// Creates an event for a modified record.
    #[must_use]
    pub fn update(
        transaction_id: TransactionId,
        id: Value,
        source_name: &str,
        changes: ChangeSet,
    ) -> Self {
        let (changed, original) = changes.into_parts();
        Self::new(
            EventKind::Update,
            transaction_id,
            id,
            source_name,
            changed,
            original,
        )
    }

    /// Creates an event for a removed record. Carries no field changes.
    #[must_use]
    pub fn delete(transaction_id: TransactionId, id: Value, source_name: &str) -> Self {
        Self::new(
            EventKind::Delete,
            transaction_id,
            id,
            source_name,
            FieldMap::new(),
            FieldMap::new(),
        )
    }

    /// Sets the source that initiated the cascading write.
    #[must_use]
    pub fn with_parent_source(mut self, parent: &str) -> Self {
        self.parent_source_name = Some(parent.to_string());
        self
    }

    /// Adds a meta entry.
    #[must_use]
    pub fn with_meta(mut self, key: &str, value: Value) -> Self {
        self.insert_meta(key, value);
        self
    }

    /// Adds or replaces a meta entry in place.
    pub fn insert_meta(&mut self, key: &str, value: Value) {
        self.meta.insert(key.to_string(), value);
    }

    /// Returns the kind of change.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Returns the event type identifier.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self.kind {
            EventKind::Create => "audit.create",
            EventKind::Update => "audit.update",
            EventKind::Delete => "audit.delete",
        }
    }

    /// Returns the correlation id shared by the whole write operation.
    #[must_use]
    pub const fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    /// Returns the primary key: a scalar for single-column keys, an object
    /// keyed by column otherwise.
    #[must_use]
    pub const fn id(&self) -> &Value {
        &self.id
    }

    /// Returns the name of the record's table.
    #[must_use]
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Returns the table that initiated the cascade, if any.
    #[must_use]
    pub fn parent_source_name(&self) -> Option<&str> {
        self.parent_source_name.as_deref()
    }

    /// Returns the new values.
    #[must_use]
    pub const fn changed(&self) -> &FieldMap {
        &self.changed
    }

    /// Returns the previous values.
    #[must_use]
    pub const fn original(&self) -> &FieldMap {
        &self.original
    }

    /// Returns the meta information attached to the event.
    #[must_use]
    pub const fn meta(&self) -> &FieldMap {
        &self.meta
    }

    /// Returns the time the event was built.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
