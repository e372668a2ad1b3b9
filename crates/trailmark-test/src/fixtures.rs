//! Blog schema fixtures: articles, authors, comments, users, tags and the
//! `articles_tags` junction.

use std::sync::Arc;

use serde_json::json;
use trailmark_core::{AuditLogHooks, FieldPolicy, Persister};

use crate::error::Result;
use crate::schema::{Association, TableSchema};
use crate::store::MemoryStore;

/// Tables defined by [`blog_store`].
pub const BLOG_TABLES: [&str; 6] = [
    "articles",
    "authors",
    "comments",
    "users",
    "tags",
    "articles_tags",
];

/// Schema of the `articles` table.
#[must_use]
pub fn articles_schema() -> TableSchema {
    TableSchema::new(
        "articles",
        ["id", "author_id", "title", "body", "published", "created", "modified"],
    )
    .with_association(Association::belongs_to("Authors", "authors", "author", "author_id"))
    .with_association(Association::has_many(
        "Comments",
        "comments",
        "comments",
        "article_id",
    ))
    .with_association(Association::belongs_to_many(
        "Tags",
        "tags",
        "tags",
        "articles_tags",
        "article_id",
        "tag_id",
    ))
}

/// Schema of the `comments` table.
#[must_use]
pub fn comments_schema() -> TableSchema {
    TableSchema::new(
        "comments",
        ["id", "article_id", "user_id", "comment", "published", "created", "updated"],
    )
    .with_association(Association::belongs_to("Users", "users", "user", "user_id"))
}

/// Builds a store with the blog tables seeded and no hooks attached.
///
/// Next generated ids: articles 4, authors 5, comments 7, users 5, tags 4.
#[must_use]
pub fn blog_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    store.define_seeded(
        articles_schema(),
        [
            json!({"id": 1, "author_id": 1, "title": "First Article", "body": "First Article Body", "published": "Y"}),
            json!({"id": 2, "author_id": 3, "title": "Second Article", "body": "Second Article Body", "published": "Y"}),
            json!({"id": 3, "author_id": 1, "title": "Third Article", "body": "Third Article Body", "published": "Y"}),
        ],
    );
    store.define_seeded(
        TableSchema::new("authors", ["id", "name"]),
        [
            json!({"id": 1, "name": "mariano"}),
            json!({"id": 2, "name": "nate"}),
            json!({"id": 3, "name": "larry"}),
            json!({"id": 4, "name": "garrett"}),
        ],
    );
    store.define_seeded(
        comments_schema(),
        [
            json!({"id": 1, "article_id": 1, "user_id": 2, "comment": "First Comment for First Article", "published": "Y"}),
            json!({"id": 2, "article_id": 1, "user_id": 4, "comment": "Second Comment for First Article", "published": "Y"}),
            json!({"id": 3, "article_id": 1, "user_id": 1, "comment": "Third Comment for First Article", "published": "Y"}),
            json!({"id": 4, "article_id": 1, "user_id": 1, "comment": "Fourth Comment for First Article", "published": "N"}),
            json!({"id": 5, "article_id": 2, "user_id": 1, "comment": "First Comment for Second Article", "published": "Y"}),
            json!({"id": 6, "article_id": 2, "user_id": 2, "comment": "Second Comment for Second Article", "published": "Y"}),
        ],
    );
    store.define_seeded(
        TableSchema::new("users", ["id", "username", "created", "updated"]),
        [
            json!({"id": 1, "username": "mariano"}),
            json!({"id": 2, "username": "nate"}),
            json!({"id": 3, "username": "larry"}),
            json!({"id": 4, "username": "garrett"}),
        ],
    );
    store.define_seeded(
        TableSchema::new("tags", ["id", "name", "created", "modified"]),
        [
            json!({"id": 1, "name": "tag1"}),
            json!({"id": 2, "name": "tag2"}),
            json!({"id": 3, "name": "tag3"}),
        ],
    );
    store.define_seeded(
        TableSchema::new("articles_tags", ["article_id", "tag_id"])
            .with_primary_key(["article_id", "tag_id"]),
        [
            json!({"article_id": 1, "tag_id": 1}),
            json!({"article_id": 1, "tag_id": 2}),
            json!({"article_id": 2, "tag_id": 1}),
            json!({"article_id": 2, "tag_id": 3}),
        ],
    );
    store
}

/// Attaches audit hooks with the default policy to each of `tables`, all
/// delivering to `persister`.
///
/// # Errors
///
/// Returns an error if a table is not defined.
pub fn audit_tables(
    store: &mut MemoryStore,
    tables: &[&str],
    persister: &Arc<dyn Persister>,
) -> Result<()> {
    audit_tables_with(store, tables, persister, &FieldPolicy::default())
}

/// Attaches audit hooks with `policy` to each of `tables`.
///
/// # Errors
///
/// Returns an error if a table is not defined.
pub fn audit_tables_with(
    store: &mut MemoryStore,
    tables: &[&str],
    persister: &Arc<dyn Persister>,
    policy: &FieldPolicy,
) -> Result<()> {
    for table in tables {
        let schema = store.schema(table)?;
        let hooks = AuditLogHooks::new(schema, Arc::clone(persister)).with_policy(policy.clone());
        store.audit(table, Arc::new(hooks))?;
    }
    Ok(())
}
