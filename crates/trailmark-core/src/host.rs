//! Introspection the host storage layer provides for audited records.

use std::fmt::Debug;

use serde_json::Value;

use crate::event::FieldMap;

/// A persistent record as seen by the audit hooks.
///
/// Dirty tracking belongs to the host: a field is dirty when it was assigned
/// since the record was loaded (or since it was built, for new records). The
/// hooks never compare values themselves.
pub trait AuditableEntity {
    /// Returns `true` if the record has not been persisted before this write.
    fn is_new(&self) -> bool;

    /// Returns the current value of a field, `None` if it is not set.
    fn get(&self, field: &str) -> Option<Value>;

    /// Returns the value a field had when the record was loaded, `None` if
    /// it was not set or not tracked.
    fn get_original(&self, field: &str) -> Option<Value>;

    /// Returns `true` if the field was assigned since load.
    fn is_dirty(&self, field: &str) -> bool;

    /// Extracts the current values of `fields`.
    ///
    /// With `only_dirty`, every dirty field is returned (unset ones as
    /// `null`); otherwise every field that is set is returned.
    fn extract(&self, fields: &[String], only_dirty: bool) -> FieldMap {
        fields
            .iter()
            .filter_map(|field| {
                if only_dirty {
                    self.is_dirty(field)
                        .then(|| (field.clone(), self.get(field).unwrap_or(Value::Null)))
                } else {
                    self.get(field).map(|value| (field.clone(), value))
                }
            })
            .collect()
    }

    /// Extracts the load-time values of `fields` that have one.
    fn extract_original(&self, fields: &[String]) -> FieldMap {
        fields
            .iter()
            .filter_map(|field| self.get_original(field).map(|value| (field.clone(), value)))
            .collect()
    }
}

/// Schema of one audited table.
pub trait SourceSchema: Send + Sync + Debug {
    /// Logical name of the table.
    fn source_name(&self) -> &str;

    /// Persisted column names, in schema order.
    fn columns(&self) -> &[String];

    /// Primary key column names.
    fn primary_key(&self) -> &[String];

    /// Property under which the named association attaches related records.
    fn association_property(&self, association: &str) -> Option<&str>;

    /// Properties of every declared association.
    fn relation_properties(&self) -> Vec<&str>;
}

/// Reads the primary key of a written record.
///
/// A single-column key yields its value; a composite key yields an object
/// keyed by column. Unset key columns read as `null`.
pub fn primary_key_value<E>(schema: &dyn SourceSchema, entity: &E) -> Value
where
    E: AuditableEntity + ?Sized,
{
    match schema.primary_key() {
        [column] => entity.get(column).unwrap_or(Value::Null),
        columns => Value::Object(
            columns
                .iter()
                .map(|column| (column.clone(), entity.get(column).unwrap_or(Value::Null)))
                .collect(),
        ),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Minimal host types shared by unit tests.

    use std::collections::HashSet;

    use super::{AuditableEntity, SourceSchema};
    use crate::event::FieldMap;
    use serde_json::Value;

    #[derive(Debug, Default, Clone)]
    pub struct StubEntity {
        pub new: bool,
        pub current: FieldMap,
        pub original: FieldMap,
        pub dirty: HashSet<String>,
    }

    impl StubEntity {
        pub fn created(values: Value) -> Self {
            let current = match values {
                Value::Object(map) => map,
                _ => FieldMap::new(),
            };
            let dirty = current.keys().cloned().collect();
            Self {
                new: true,
                current,
                original: FieldMap::new(),
                dirty,
            }
        }

        pub fn loaded(values: Value) -> Self {
            let current = match values {
                Value::Object(map) => map,
                _ => FieldMap::new(),
            };
            Self {
                new: false,
                original: current.clone(),
                current,
                dirty: HashSet::new(),
            }
        }

        pub fn set(mut self, field: &str, value: Value) -> Self {
            self.current.insert(field.to_string(), value);
            self.dirty.insert(field.to_string());
            self
        }
    }

    impl AuditableEntity for StubEntity {
        fn is_new(&self) -> bool {
            self.new
        }

        fn get(&self, field: &str) -> Option<Value> {
            self.current.get(field).cloned()
        }

        fn get_original(&self, field: &str) -> Option<Value> {
            self.original.get(field).cloned()
        }

        fn is_dirty(&self, field: &str) -> bool {
            self.dirty.contains(field)
        }
    }

    #[derive(Debug, Clone)]
    pub struct StubSchema {
        pub name: String,
        pub columns: Vec<String>,
        pub primary_key: Vec<String>,
        pub associations: Vec<(String, String)>,
    }

    impl StubSchema {
        pub fn articles() -> Self {
            Self {
                name: "articles".to_string(),
                columns: ["id", "author_id", "title", "body", "published", "created", "modified"]
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                primary_key: vec!["id".to_string()],
                associations: vec![
                    ("Authors".to_string(), "author".to_string()),
                    ("Comments".to_string(), "comments".to_string()),
                ],
            }
        }
    }

    impl SourceSchema for StubSchema {
        fn source_name(&self) -> &str {
            &self.name
        }

        fn columns(&self) -> &[String] {
            &self.columns
        }

        fn primary_key(&self) -> &[String] {
            &self.primary_key
        }

        fn association_property(&self, association: &str) -> Option<&str> {
            self.associations
                .iter()
                .find(|(name, _)| name == association)
                .map(|(_, property)| property.as_str())
        }

        fn relation_properties(&self) -> Vec<&str> {
            self.associations
                .iter()
                .map(|(_, property)| property.as_str())
                .collect()
        }
    }
}
