//! # Trailmark Core
//!
//! Transaction-correlated change auditing for persistent records.
//!
//! A host storage layer (an ORM, a repository layer) calls the
//! [`WriteHooks`] around every write. Trailmark computes field-level diffs,
//! correlates every record written by one top-level operation, cascades
//! included, under a single [`TransactionId`], and hands the ordered batch
//! to a [`Persister`] once the write has durably committed.
//!
//! - [`compute_change`] - field-level diff honoring a [`FieldPolicy`]
//! - [`AuditEvent`] - immutable create/update/delete record
//! - [`WriteContext`] - per-operation transaction id and event queue
//! - [`AuditLogHooks`] - the lifecycle hook adapter for one table
//! - [`SinkDispatcher`] - commit-time delivery to a persister
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trailmark_core::{AuditLogHooks, TracingPersister, WriteContext, WriteHooks};
//!
//! let hooks = AuditLogHooks::new(articles_schema, Arc::new(TracingPersister::new()));
//!
//! let mut ctx = WriteContext::new();
//! hooks.before_write(&article, &mut ctx);
//! // ... write the row, cascading into related tables with the same ctx ...
//! hooks.after_write(&article, &mut ctx, true, &[]);
//! // ... commit ...
//! hooks.after_commit(&article, &mut ctx)?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod context;
mod diff;
mod dispatcher;
pub mod error;
mod event;
mod hooks;
mod host;
mod persister;
mod policy;


pub use context::{RecordKey, TransactionId, TransactionQueue, WriteContext};
pub use diff::compute_change;
pub use dispatcher::{BeforeLog, SinkDispatcher};
pub use error::{AuditError, PersistError, Result};
pub use event::{AuditEvent, ChangeSet, EventKind, FieldMap};
pub use hooks::{AuditLogHooks, DeleteHook, NoopDeleteHook, WriteHooks};
pub use host::{primary_key_value, AuditableEntity, SourceSchema};
pub use persister::{InMemoryPersister, JsonLinesPersister, Persister, TracingPersister};
pub use policy::{FieldPolicy, DEFAULT_BLACKLIST};
