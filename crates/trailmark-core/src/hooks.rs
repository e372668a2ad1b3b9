//! Lifecycle hooks the host storage layer calls around every write.
//!
//! The host calls, for each record it writes:
//!
//! 1. [`WriteHooks::before_write`] before the row is written,
//! 2. [`WriteHooks::after_write`] once the row is written (generated keys
//!    available), and
//! 3. [`WriteHooks::after_commit`] once for the top-level record, after the
//!    enclosing transaction has durably committed.
//!
//! On rollback the host simply never calls `after_commit`; the queued events
//! are dropped with the context.

use std::fmt::Debug;
use std::sync::Arc;

use tracing::debug;

use crate::context::{RecordKey, TransactionId, WriteContext};
use crate::diff::compute_change;
use crate::dispatcher::{BeforeLog, SinkDispatcher};
use crate::error::Result;
use crate::event::AuditEvent;
use crate::host::{primary_key_value, AuditableEntity, SourceSchema};
use crate::persister::Persister;
use crate::policy::FieldPolicy;

/// Three-phase write notification contract, plus the delete hook point.
pub trait WriteHooks: Send + Sync + Debug {
    /// Called before a record is written.
    fn before_write(&self, entity: &dyn AuditableEntity, ctx: &mut WriteContext);

    /// Called after a record is written. `associated` names the
    /// associations saved along with it.
    fn after_write(
        &self,
        entity: &dyn AuditableEntity,
        ctx: &mut WriteContext,
        is_new: bool,
        associated: &[String],
    );

    /// Called after the enclosing transaction committed.
    ///
    /// # Errors
    ///
    /// Returns an error if the committed batch could not be delivered.
    fn after_commit(&self, entity: &dyn AuditableEntity, ctx: &mut WriteContext) -> Result<usize>;

    /// Called when a record is deleted, before the transaction commits.
    fn on_delete(&self, entity: &dyn AuditableEntity, ctx: &mut WriteContext);
}

/// Extension point deciding what, if anything, a delete records.
pub trait DeleteHook: Send + Sync + Debug {
    /// Builds the event for a deleted record, or `None` to record nothing.
    fn on_delete(
        &self,
        entity: &dyn AuditableEntity,
        schema: &dyn SourceSchema,
        transaction: TransactionId,
    ) -> Option<AuditEvent>;
}

/// Delete hook that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDeleteHook;

impl DeleteHook for NoopDeleteHook {
    fn on_delete(
        &self,
        _entity: &dyn AuditableEntity,
        _schema: &dyn SourceSchema,
        _transaction: TransactionId,
    ) -> Option<AuditEvent> {
        None
    }
}

/// Audit hooks for one table.
///
/// # Examples
///
/// ```ignore
/// let hooks = AuditLogHooks::new(articles_schema, Arc::new(TracingPersister::new()))
///     .with_policy(FieldPolicy::default().exclude("password"));
/// ```
#[derive(Debug, Clone)]
pub struct AuditLogHooks {
    schema: Arc<dyn SourceSchema>,
    policy: FieldPolicy,
    dispatcher: SinkDispatcher,
    delete_hook: Arc<dyn DeleteHook>,
}

impl AuditLogHooks {
    /// Creates hooks for `schema` delivering to `persister`, with the default
    /// field policy.
    #[must_use]
    pub fn new(schema: Arc<dyn SourceSchema>, persister: Arc<dyn Persister>) -> Self {
        Self {
            schema,
            policy: FieldPolicy::default(),
            dispatcher: SinkDispatcher::new(persister),
            delete_hook: Arc::new(NoopDeleteHook),
        }
    }

    /// Sets the field policy.
    #[must_use]
    pub fn with_policy(mut self, policy: FieldPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Adds a before-log listener.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn BeforeLog>) -> Self {
        self.dispatcher = self.dispatcher.with_listener(listener);
        self
    }

    /// Sets the delete hook.
    #[must_use]
    pub fn with_delete_hook(mut self, hook: Arc<dyn DeleteHook>) -> Self {
        self.delete_hook = hook;
        self
    }

    /// Returns the table schema.
    #[must_use]
    pub fn schema(&self) -> &dyn SourceSchema {
        &*self.schema
    }

    /// Returns the field policy.
    #[must_use]
    pub const fn policy(&self) -> &FieldPolicy {
        &self.policy
    }

    /// Returns the configured persister.
    #[must_use]
    pub fn persister(&self) -> &Arc<dyn Persister> {
        self.dispatcher.persister()
    }

    fn build_event(
        &self,
        entity: &dyn AuditableEntity,
        transaction: TransactionId,
        parent: Option<&str>,
        is_new: bool,
        associated: &[String],
    ) -> Option<(RecordKey, AuditEvent)> {
        let schema = self.schema();
        let source = schema.source_name();

        let association_properties: Vec<String> = associated
            .iter()
            .filter_map(|name| {
                let property = schema.association_property(name);
                if property.is_none() {
                    debug!(source, association = %name, "Unknown association, ignoring");
                }
                property.map(ToString::to_string)
            })
            .collect();
        let included = self
            .policy
            .effective_fields(schema.columns(), &association_properties);

        let mut relations = schema.relation_properties();
        relations.extend(association_properties.iter().map(String::as_str));

        let Some(changes) = compute_change(entity, &included, &relations, is_new) else {
            debug!(transaction_id = %transaction, source, "No audited field changed");
            return None;
        };

        let id = primary_key_value(schema, entity);
        let event = if is_new {
            AuditEvent::create(transaction, id.clone(), source, changes)
        } else {
            AuditEvent::update(transaction, id.clone(), source, changes)
        };
        let event = match parent {
            Some(parent) if parent != source => event.with_parent_source(parent),
            _ => event,
        };

        Some((RecordKey::new(source, id), event))
    }
}

impl WriteHooks for AuditLogHooks {
    fn before_write(&self, _entity: &dyn AuditableEntity, ctx: &mut WriteContext) {
        ctx.ensure();
    }

    fn after_write(
        &self,
        entity: &dyn AuditableEntity,
        ctx: &mut WriteContext,
        is_new: bool,
        associated: &[String],
    ) {
        if !ctx.is_active() {
            return;
        }
        let Some(transaction) = ctx.transaction_id() else {
            return;
        };

        let parent = ctx.cascade_source().map(ToString::to_string);
        if let Some((owner, event)) =
            self.build_event(entity, transaction, parent.as_deref(), is_new, associated)
        {
            ctx.enqueue(owner, event);
        }
    }

    fn after_commit(&self, _entity: &dyn AuditableEntity, ctx: &mut WriteContext) -> Result<usize> {
        self.dispatcher.flush(ctx, self.schema.source_name())
    }

    fn on_delete(&self, entity: &dyn AuditableEntity, ctx: &mut WriteContext) {
        let transaction = ctx.ensure();
        let Some(event) = self.delete_hook.on_delete(entity, self.schema(), transaction) else {
            return;
        };

        let owner = RecordKey::new(self.schema.source_name(), event.id().clone());
        ctx.enqueue(owner, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::host::testing::{StubEntity, StubSchema};
    use crate::persister::InMemoryPersister;
    use serde_json::json;

    fn hooks() -> (AuditLogHooks, Arc<InMemoryPersister>) {
        let persister = Arc::new(InMemoryPersister::new());
        let hooks = AuditLogHooks::new(Arc::new(StubSchema::articles()), persister.clone());
        (hooks, persister)
    }

    #[test]
    fn test_update_scalar_field() {
        let (hooks, persister) = hooks();
        let entity = StubEntity::loaded(json!({"id": 1, "title": "Old", "published": "N"}))
            .set("title", json!("Changed title"));
        let mut ctx = WriteContext::new();

        hooks.before_write(&entity, &mut ctx);
        hooks.after_write(&entity, &mut ctx, false, &[]);
        assert_eq!(hooks.after_commit(&entity, &mut ctx).unwrap(), 1);

        let events = persister.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), EventKind::Update);
        assert_eq!(events[0].id(), &json!(1));
        assert_eq!(events[0].changed().len(), 1);
        assert_eq!(events[0].original()["title"], json!("Old"));
    }

    #[test]
    fn test_blacklisted_fields_never_audited() {
        let (hooks, persister) = hooks();
        let entity = StubEntity::loaded(json!({"id": 1, "modified": "a"}))
            .set("modified", json!("b"));
        let mut ctx = WriteContext::new();

        hooks.before_write(&entity, &mut ctx);
        hooks.after_write(&entity, &mut ctx, false, &[]);
        assert_eq!(hooks.after_commit(&entity, &mut ctx).unwrap(), 0);
        assert_eq!(persister.call_count(), 0);
    }

    #[test]
    fn test_after_write_without_before_write_is_ignored() {
        let (hooks, persister) = hooks();
        let entity = StubEntity::created(json!({"id": 4, "title": "x"}));
        let mut ctx = WriteContext::new();

        hooks.after_write(&entity, &mut ctx, true, &[]);
        hooks.after_commit(&entity, &mut ctx).unwrap();
        assert_eq!(persister.call_count(), 0);
    }

    #[test]
    fn test_association_property_excluded() {
        let (hooks, persister) = hooks();
        let entity = StubEntity::created(json!({"id": 4, "title": "New", "author_id": 5}))
            .set("author", json!({"id": 5, "name": "Jose"}));
        let mut ctx = WriteContext::new();

        hooks.before_write(&entity, &mut ctx);
        hooks.after_write(&entity, &mut ctx, true, &["Authors".to_string()]);
        hooks.after_commit(&entity, &mut ctx).unwrap();

        let event = &persister.events()[0];
        assert_eq!(event.kind(), EventKind::Create);
        assert_eq!(event.changed()["author_id"], json!(5));
        assert!(!event.changed().contains_key("author"));
        assert!(event.original().is_empty());
    }

    #[test]
    fn test_parent_source_from_cascade() {
        let persister = Arc::new(InMemoryPersister::new());
        let mut schema = StubSchema::articles();
        schema.name = "tags".to_string();
        let hooks = AuditLogHooks::new(Arc::new(schema), persister.clone())
            .with_policy(FieldPolicy::default().with_whitelist(["id", "name"]));
        let entity = StubEntity::created(json!({"id": 4, "name": "new tag"}));
        let mut ctx = WriteContext::new();

        ctx.cascade("articles", |ctx| {
            hooks.before_write(&entity, ctx);
            hooks.after_write(&entity, ctx, true, &[]);
        });
        let queued = ctx.queue().unwrap();
        let events = queued.events_for(&RecordKey::new("tags", json!(4)));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].parent_source_name(), Some("articles"));
    }

    #[derive(Debug)]
    struct RecordDeletes;

    impl DeleteHook for RecordDeletes {
        fn on_delete(
            &self,
            entity: &dyn AuditableEntity,
            schema: &dyn SourceSchema,
            transaction: TransactionId,
        ) -> Option<AuditEvent> {
            Some(AuditEvent::delete(
                transaction,
                primary_key_value(schema, entity),
                schema.source_name(),
            ))
        }
    }

    #[test]
    fn test_default_delete_hook_records_nothing() {
        let (hooks, persister) = hooks();
        let entity = StubEntity::loaded(json!({"id": 1}));
        let mut ctx = WriteContext::new();

        hooks.on_delete(&entity, &mut ctx);
        hooks.after_commit(&entity, &mut ctx).unwrap();
        assert_eq!(persister.call_count(), 0);
    }

    #[test]
    fn test_custom_delete_hook_queues_event() {
        let (hooks, persister) = hooks();
        let hooks = hooks.with_delete_hook(Arc::new(RecordDeletes));
        let entity = StubEntity::loaded(json!({"id": 1}));
        let mut ctx = WriteContext::new();

        hooks.on_delete(&entity, &mut ctx);
        hooks.after_commit(&entity, &mut ctx).unwrap();

        let events = persister.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), EventKind::Delete);
        assert_eq!(events[0].id(), &json!(1));
    }
}
