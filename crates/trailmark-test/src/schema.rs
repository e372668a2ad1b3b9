//! Table schemas and associations for the in-memory store.

use trailmark_core::SourceSchema;

/// How two tables are related.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationKind {
    /// This table holds the foreign key of a single parent record.
    BelongsTo,
    /// The target table holds a foreign key pointing back at this table.
    HasMany,
    /// Records are linked through a junction table.
    BelongsToMany {
        /// Junction table name.
        junction: String,
        /// Junction column pointing at the target table.
        target_foreign_key: String,
    },
}

/// A declared association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    /// Association name (e.g. `Authors`).
    pub name: String,
    /// Relationship kind.
    pub kind: AssociationKind,
    /// Target table name.
    pub target: String,
    /// Record property holding the related record(s).
    pub property: String,
    /// Foreign key column: on this table for belongs-to, on the target or
    /// junction table otherwise.
    pub foreign_key: String,
}

impl Association {
    /// Declares a belongs-to association.
    #[must_use]
    pub fn belongs_to(name: &str, target: &str, property: &str, foreign_key: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: AssociationKind::BelongsTo,
            target: target.to_string(),
            property: property.to_string(),
            foreign_key: foreign_key.to_string(),
        }
    }

    /// Declares a has-many association.
    #[must_use]
    pub fn has_many(name: &str, target: &str, property: &str, foreign_key: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: AssociationKind::HasMany,
            target: target.to_string(),
            property: property.to_string(),
            foreign_key: foreign_key.to_string(),
        }
    }

    /// Declares a belongs-to-many association through `junction`.
    #[must_use]
    pub fn belongs_to_many(
        name: &str,
        target: &str,
        property: &str,
        junction: &str,
        foreign_key: &str,
        target_foreign_key: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            kind: AssociationKind::BelongsToMany {
                junction: junction.to_string(),
                target_foreign_key: target_foreign_key.to_string(),
            },
            target: target.to_string(),
            property: property.to_string(),
            foreign_key: foreign_key.to_string(),
        }
    }
}

/// Schema of an in-memory table.
///
/// # Examples
///
/// ```rust
/// use trailmark_test::{Association, TableSchema};
/// use trailmark_core::SourceSchema;
///
/// let schema = TableSchema::new("articles", ["id", "author_id", "title"])
///     .with_association(Association::belongs_to("Authors", "authors", "author", "author_id"));
///
/// assert_eq!(schema.primary_key(), ["id"]);
/// assert_eq!(schema.association_property("Authors"), Some("author"));
/// ```
#[derive(Debug, Clone)]
pub struct TableSchema {
    name: String,
    columns: Vec<String>,
    primary_key: Vec<String>,
    associations: Vec<Association>,
}

impl TableSchema {
    /// Creates a schema with an `id` primary key.
    #[must_use]
    pub fn new<I, S>(name: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            columns: columns.into_iter().map(Into::into).collect(),
            primary_key: vec!["id".to_string()],
            associations: Vec::new(),
        }
    }

    /// Replaces the primary key columns.
    #[must_use]
    pub fn with_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Declares an association.
    #[must_use]
    pub fn with_association(mut self, association: Association) -> Self {
        self.associations.push(association);
        self
    }

    /// Returns the declared associations.
    #[must_use]
    pub fn associations(&self) -> &[Association] {
        &self.associations
    }

    /// Returns `true` if the primary key is a single generated `id`.
    #[must_use]
    pub fn has_generated_key(&self) -> bool {
        self.primary_key == ["id"]
    }
}

impl SourceSchema for TableSchema {
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
            .find(|a| a.name == association)
            .map(|a| a.property.as_str())
    }

    fn relation_properties(&self) -> Vec<&str> {
        self.associations.iter().map(|a| a.property.as_str()).collect()
    }
}
