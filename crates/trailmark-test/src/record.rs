//! Records with dirty tracking and attached related records.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use trailmark_core::{AuditableEntity, FieldMap};

/// Related record(s) attached under an association property.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// A single related record (belongs-to).
    One(Box<Record>),
    /// A collection of related records (has-many, belongs-to-many).
    Many(Vec<Record>),
}

impl Related {
    fn to_value(&self) -> Value {
        match self {
            Self::One(record) => Value::Object(record.values.clone()),
            Self::Many(records) => Value::Array(
                records
                    .iter()
                    .map(|r| Value::Object(r.values.clone()))
                    .collect(),
            ),
        }
    }
}

/// A row of an in-memory table, as an ORM entity.
///
/// # Examples
///
/// ```rust
/// use trailmark_test::Record;
/// use trailmark_core::AuditableEntity;
/// use serde_json::json;
///
/// let mut article = Record::new(json!({"title": "New Article"}));
/// assert!(article.is_new());
/// assert!(article.is_dirty("title"));
///
/// article.set("body", json!("text"));
/// assert_eq!(article.get("body"), Some(json!("text")));
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    values: FieldMap,
    original: FieldMap,
    dirty: BTreeSet<String>,
    related: BTreeMap<String, Related>,
    new: bool,
}

fn object(values: Value) -> FieldMap {
    match values {
        Value::Object(map) => map,
        _ => FieldMap::new(),
    }
}

impl Record {
    /// Builds a record that does not exist yet. Every given field is dirty.
    #[must_use]
    pub fn new(values: Value) -> Self {
        let values = object(values);
        let dirty = values.keys().cloned().collect();
        Self {
            values,
            original: FieldMap::new(),
            dirty,
            related: BTreeMap::new(),
            new: true,
        }
    }

    /// Builds a clean record as loaded from storage.
    #[must_use]
    pub fn loaded(values: FieldMap) -> Self {
        Self {
            original: values.clone(),
            values,
            dirty: BTreeSet::new(),
            related: BTreeMap::new(),
            new: false,
        }
    }

    /// Assigns a field and marks it dirty.
    ///
    /// Assigning a persisted record the value it already holds is a no-op.
    pub fn set(&mut self, field: &str, value: Value) {
        if !self.new && self.values.get(field) == Some(&value) {
            return;
        }
        self.values.insert(field.to_string(), value);
        self.dirty.insert(field.to_string());
    }

    /// Attaches a single related record and marks the property dirty.
    pub fn attach(&mut self, property: &str, record: Record) {
        self.related
            .insert(property.to_string(), Related::One(Box::new(record)));
        self.dirty.insert(property.to_string());
    }

    /// Appends a record to a related collection and marks the property dirty.
    pub fn push_related(&mut self, property: &str, record: Record) {
        match self.related.get_mut(property) {
            Some(Related::Many(records)) => records.push(record),
            _ => {
                self.related
                    .insert(property.to_string(), Related::Many(vec![record]));
            }
        }
        self.dirty.insert(property.to_string());
    }

    /// Attaches related records without marking anything dirty.
    pub(crate) fn load_related(&mut self, property: &str, related: Related) {
        self.related.insert(property.to_string(), related);
    }

    /// Returns the related record(s) under `property`.
    #[must_use]
    pub fn related(&self, property: &str) -> Option<&Related> {
        self.related.get(property)
    }

    pub(crate) fn related_mut(&mut self, property: &str) -> Option<&mut Related> {
        self.related.get_mut(property)
    }

    /// Returns the persisted field values.
    #[must_use]
    pub const fn values(&self) -> &FieldMap {
        &self.values
    }

    /// Returns `true` if the record must be written: it is new, a field was
    /// assigned, or a related record needs writing.
    #[must_use]
    pub fn needs_save(&self) -> bool {
        self.new
            || !self.dirty.is_empty()
            || self.related.values().any(|related| match related {
                Related::One(record) => record.needs_save(),
                Related::Many(records) => records.iter().any(Self::needs_save),
            })
    }

    /// Marks the record and its related records as persisted and clean.
    pub fn clean(&mut self) {
        self.new = false;
        self.dirty.clear();
        self.original = self.values.clone();
        for related in self.related.values_mut() {
            match related {
                Related::One(record) => record.clean(),
                Related::Many(records) => records.iter_mut().for_each(Self::clean),
            }
        }
    }
}

impl AuditableEntity for Record {
    fn is_new(&self) -> bool {
        self.new
    }

    fn get(&self, field: &str) -> Option<Value> {
        self.values
            .get(field)
            .cloned()
            .or_else(|| self.related.get(field).map(Related::to_value))
    }

    fn get_original(&self, field: &str) -> Option<Value> {
        if self.new {
            return None;
        }
        self.original.get(field).cloned()
    }

    fn is_dirty(&self, field: &str) -> bool {
        self.dirty.contains(field)
    }
}
