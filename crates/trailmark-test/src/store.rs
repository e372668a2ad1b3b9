//! In-memory record store that drives audit hooks like an ORM.
//!
//! Saving a record writes, in order: its belongs-to parents, its own row,
//! its has-many children, then its belongs-to-many targets followed by the
//! junction rows linking them. Every write of one `save` call shares one
//! [`WriteContext`]. The whole operation runs in a transaction: any failed
//! write restores every table and `after_commit` is never called.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};
use trailmark_core::{AuditableEntity, FieldMap, SourceSchema, WriteContext, WriteHooks};

use crate::error::{Result, StoreError};
use crate::record::{Record, Related};
use crate::schema::{AssociationKind, TableSchema};

#[derive(Debug)]
struct Table {
    schema: Arc<TableSchema>,
    rows: Vec<FieldMap>,
    next_id: i64,
    hooks: Option<Arc<dyn WriteHooks>>,
}

impl Table {
    fn insert_rows(&mut self, rows: impl IntoIterator<Item = Value>) {
        for row in rows {
            let Value::Object(row) = row else { continue };
            if let Some(id) = row.get("id").and_then(Value::as_i64) {
                self.next_id = self.next_id.max(id + 1);
            }
            self.rows.push(row);
        }
    }
}

type Snapshot = BTreeMap<String, (Vec<FieldMap>, i64)>;

/// In-memory tables with transactional, cascading saves.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, Table>,
    failing: BTreeSet<String>,
}

fn key_of(schema: &TableSchema, record: &Record) -> FieldMap {
    schema
        .primary_key()
        .iter()
        .map(|column| (column.clone(), record.get(column).unwrap_or(Value::Null)))
        .collect()
}

fn row_matches(schema: &TableSchema, row: &FieldMap, key: &FieldMap) -> bool {
    schema
        .primary_key()
        .iter()
        .all(|column| row.get(column) == key.get(column))
}

fn id_of(record: &Record) -> Value {
    record.get("id").unwrap_or(Value::Null)
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines a table, replacing any previous definition.
    pub fn define(&mut self, schema: TableSchema) -> Arc<TableSchema> {
        self.define_seeded(schema, Vec::new())
    }

    /// Defines a table holding `rows`, bypassing hooks.
    ///
    /// Generated ids continue after the highest seeded `id`.
    pub fn define_seeded(
        &mut self,
        schema: TableSchema,
        rows: impl IntoIterator<Item = Value>,
    ) -> Arc<TableSchema> {
        let schema = Arc::new(schema);
        let mut table = Table {
            schema: Arc::clone(&schema),
            rows: Vec::new(),
            next_id: 1,
            hooks: None,
        };
        table.insert_rows(rows);
        self.tables.insert(schema.source_name().to_string(), table);
        schema
    }

    /// Returns the schema of a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is not defined.
    pub fn schema(&self, table: &str) -> Result<Arc<TableSchema>> {
        self.table(table).map(|t| Arc::clone(&t.schema))
    }

    /// Attaches write hooks to a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is not defined.
    pub fn audit(&mut self, table: &str, hooks: Arc<dyn WriteHooks>) -> Result<()> {
        self.table_mut(table)?.hooks = Some(hooks);
        Ok(())
    }

    /// Inserts rows directly, bypassing hooks.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is not defined.
    pub fn seed(&mut self, table: &str, rows: impl IntoIterator<Item = Value>) -> Result<()> {
        self.table_mut(table)?.insert_rows(rows);
        Ok(())
    }

    /// Makes every subsequent write to `table` fail.
    pub fn fail_writes_to(&mut self, table: &str) {
        self.failing.insert(table.to_string());
    }

    /// Returns all rows of a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is not defined.
    pub fn rows(&self, table: &str) -> Result<&[FieldMap]> {
        self.table(table).map(|t| t.rows.as_slice())
    }

    /// Loads a record by `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is not defined or no row matches.
    pub fn get(&self, table: &str, id: i64) -> Result<Record> {
        self.get_with(table, id, &[])
    }

    /// Loads a record by `id` together with the named associations.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or an association is unknown, or no
    /// row matches.
    pub fn get_with(&self, table: &str, id: i64, contain: &[&str]) -> Result<Record> {
        let schema = self.schema(table)?;
        let row = self.find_by(table, "id", &json!(id)).into_iter().next().ok_or_else(|| {
            StoreError::NotFound {
                table: table.to_string(),
                key: json!({ "id": id }).to_string(),
            }
        })?;
        let mut record = Record::loaded(row.clone());

        for name in contain {
            let association = schema
                .associations()
                .iter()
                .find(|a| a.name == *name)
                .ok_or_else(|| StoreError::UnknownAssociation {
                    table: table.to_string(),
                    association: (*name).to_string(),
                })?;

            let related = match &association.kind {
                AssociationKind::BelongsTo => {
                    let key = row.get(&association.foreign_key).cloned().unwrap_or(Value::Null);
                    match self.find_by(&association.target, "id", &key).into_iter().next() {
                        Some(parent) => Related::One(Box::new(Record::loaded(parent.clone()))),
                        None => continue,
                    }
                }
                AssociationKind::HasMany => Related::Many(
                    self.find_by(&association.target, &association.foreign_key, &json!(id))
                        .into_iter()
                        .map(|r| Record::loaded(r.clone()))
                        .collect(),
                ),
                AssociationKind::BelongsToMany {
                    junction,
                    target_foreign_key,
                } => {
                    let mut targets = Vec::new();
                    for link in self.find_by(junction, &association.foreign_key, &json!(id)) {
                        let key = link.get(target_foreign_key).cloned().unwrap_or(Value::Null);
                        for target in self.find_by(&association.target, "id", &key) {
                            targets.push(Record::loaded(target.clone()));
                        }
                    }
                    Related::Many(targets)
                }
            };
            record.load_related(&association.property, related);
        }

        Ok(record)
    }

    /// Saves a record and everything attached to it in one transaction.
    ///
    /// Calls `after_commit` on the hooks of `table` once the transaction
    /// committed; the record is clean by then.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WriteFailed`] (after rolling back) if any write
    /// failed, or [`StoreError::Audit`] if the committed batch could not be
    /// delivered.
    pub fn save(&mut self, table: &str, record: &mut Record) -> Result<()> {
        let snapshot = self.snapshot();
        let mut ctx = WriteContext::new();

        if let Err(err) = self.save_record(table, record, &mut ctx) {
            warn!(table, error = %err, "Rolling back write");
            self.restore(snapshot);
            return Err(err);
        }

        debug!(table, "Committed write");
        record.clean();
        if let Some(hooks) = self.hooks(table) {
            hooks.after_commit(&*record, &mut ctx)?;
        }
        Ok(())
    }

    /// Deletes a record in its own transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the row does not exist or the write failed (both
    /// roll back), or if the committed batch could not be delivered.
    pub fn delete(&mut self, table: &str, record: &Record) -> Result<()> {
        let schema = self.schema(table)?;
        let hooks = self.hooks(table);
        let snapshot = self.snapshot();
        let mut ctx = WriteContext::new();

        if let Some(hooks) = &hooks {
            hooks.on_delete(record, &mut ctx);
        }

        let key = key_of(&schema, record);
        let result = if self.failing.contains(table) {
            Err(StoreError::WriteFailed {
                table: table.to_string(),
            })
        } else {
            let rows = &mut self.table_mut(table)?.rows;
            let before = rows.len();
            rows.retain(|row| !row_matches(&schema, row, &key));
            if rows.len() == before {
                Err(StoreError::NotFound {
                    table: table.to_string(),
                    key: Value::Object(key).to_string(),
                })
            } else {
                Ok(())
            }
        };

        if let Err(err) = result {
            warn!(table, error = %err, "Rolling back delete");
            self.restore(snapshot);
            return Err(err);
        }

        if let Some(hooks) = &hooks {
            hooks.after_commit(record, &mut ctx)?;
        }
        Ok(())
    }

    fn save_record(&mut self, table: &str, record: &mut Record, ctx: &mut WriteContext) -> Result<()> {
        if !record.needs_save() {
            return Ok(());
        }
        let schema = self.schema(table)?;
        let hooks = self.hooks(table);
        if let Some(hooks) = &hooks {
            hooks.before_write(&*record, ctx);
        }

        let mut associated = Vec::new();

        for association in schema.associations() {
            if association.kind != AssociationKind::BelongsTo {
                continue;
            }
            let parent_id = {
                let Some(Related::One(parent)) = record.related_mut(&association.property) else {
                    continue;
                };
                ctx.cascade(table, |ctx| self.save_record(&association.target, &mut **parent, ctx))?;
                id_of(parent)
            };
            record.set(&association.foreign_key, parent_id);
            associated.push(association.name.clone());
        }

        let is_new = record.is_new();
        self.write_row(&schema, record)?;
        let id = id_of(record);

        for association in schema.associations() {
            match &association.kind {
                AssociationKind::BelongsTo => {}
                AssociationKind::HasMany => {
                    let Some(Related::Many(children)) = record.related_mut(&association.property)
                    else {
                        continue;
                    };
                    for child in children.iter_mut() {
                        child.set(&association.foreign_key, id.clone());
                        ctx.cascade(table, |ctx| self.save_record(&association.target, child, ctx))?;
                    }
                    associated.push(association.name.clone());
                }
                AssociationKind::BelongsToMany {
                    junction,
                    target_foreign_key,
                } => {
                    let Some(Related::Many(targets)) = record.related_mut(&association.property)
                    else {
                        continue;
                    };
                    for target in targets.iter_mut() {
                        ctx.cascade(table, |ctx| self.save_record(&association.target, target, ctx))?;
                    }
                    let target_ids: Vec<Value> = targets.iter().map(id_of).collect();

                    for target_id in target_ids {
                        let linked = self
                            .find_by(junction, &association.foreign_key, &id)
                            .iter()
                            .any(|link| link.get(target_foreign_key) == Some(&target_id));
                        if linked {
                            continue;
                        }
                        let mut values = FieldMap::new();
                        values.insert(association.foreign_key.clone(), id.clone());
                        values.insert(target_foreign_key.clone(), target_id);
                        let mut link = Record::new(Value::Object(values));
                        ctx.cascade(table, |ctx| self.save_record(junction, &mut link, ctx))?;
                    }
                    associated.push(association.name.clone());
                }
            }
        }

        if let Some(hooks) = &hooks {
            hooks.after_write(&*record, ctx, is_new, &associated);
        }
        Ok(())
    }

    fn write_row(&mut self, schema: &TableSchema, record: &mut Record) -> Result<()> {
        let name = schema.source_name();
        if self.failing.contains(name) {
            return Err(StoreError::WriteFailed {
                table: name.to_string(),
            });
        }

        let table = self.table_mut(name)?;
        if record.is_new() && schema.has_generated_key() && record.get("id").is_none() {
            record.set("id", json!(table.next_id));
            table.next_id += 1;
        }

        let row: FieldMap = schema
            .columns()
            .iter()
            .filter_map(|column| {
                record
                    .values()
                    .get(column)
                    .map(|value| (column.clone(), value.clone()))
            })
            .collect();
        let key = key_of(schema, record);

        match table.rows.iter_mut().find(|existing| row_matches(schema, existing, &key)) {
            Some(existing) => existing.extend(row),
            None => table.rows.push(row),
        }
        let key = Value::Object(key);
        debug!(table = name, key = %key, "Wrote row");
        Ok(())
    }

    fn find_by(&self, table: &str, column: &str, value: &Value) -> Vec<&FieldMap> {
        self.tables
            .get(table)
            .map(|t| {
                t.rows
                    .iter()
                    .filter(|row| row.get(column) == Some(value))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn hooks(&self, table: &str) -> Option<Arc<dyn WriteHooks>> {
        self.tables.get(table).and_then(|t| t.hooks.clone())
    }

    fn table(&self, table: &str) -> Result<&Table> {
        self.tables.get(table).ok_or_else(|| StoreError::UnknownTable {
            table: table.to_string(),
        })
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable {
                table: table.to_string(),
            })
    }

    fn snapshot(&self) -> Snapshot {
        self.tables
            .iter()
            .map(|(name, t)| (name.clone(), (t.rows.clone(), t.next_id)))
            .collect()
    }

    fn restore(&mut self, snapshot: Snapshot) {
        for (name, (rows, next_id)) in snapshot {
            if let Some(table) = self.tables.get_mut(&name) {
                table.rows = rows;
                table.next_id = next_id;
            }
        }
    }
}
