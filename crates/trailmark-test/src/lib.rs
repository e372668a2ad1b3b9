//! # Trailmark Test
//!
//! An in-memory host storage layer for exercising Trailmark audit hooks.
//!
//! This crate provides:
//!
//! - [`MemoryStore`] - tables with transactional saves that cascade through
//!   belongs-to, has-many and belongs-to-many associations, calling the
//!   attached [`WriteHooks`](trailmark_core::WriteHooks) exactly as an ORM
//!   would
//! - [`Record`] - entities with dirty tracking and attached related records
//! - [`fixtures`] - a seeded blog schema (articles, authors, comments, tags)
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use trailmark_core::{InMemoryPersister, Persister};
//! use trailmark_test::fixtures::{audit_tables, blog_store};
//!
//! let persister = Arc::new(InMemoryPersister::new());
//! let sink: Arc<dyn Persister> = persister.clone();
//!
//! let mut store = blog_store();
//! audit_tables(&mut store, &["articles"], &sink)?;
//!
//! let mut article = store.get("articles", 1)?;
//! article.set("title", json!("Changed title"));
//! store.save("articles", &mut article)?;
//!
//! assert_eq!(persister.events().len(), 1);
//! # Ok::<(), trailmark_test::StoreError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod fixtures;
mod record;
mod schema;
mod store;

pub use error::{Result, StoreError};
pub use record::{Record, Related};
pub use schema::{Association, AssociationKind, TableSchema};
pub use store::MemoryStore;
