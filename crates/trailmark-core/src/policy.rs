//! Per-table field inclusion policy.

use serde::{Deserialize, Serialize};

/// Fields excluded from every diff unless the blacklist is overridden.
pub const DEFAULT_BLACKLIST: [&str; 2] = ["created", "modified"];

/// Blacklist/whitelist pair deciding which fields of a table are audited.
///
/// An empty whitelist means "every persisted column plus the properties of
/// the associations touched by the write". The blacklist always wins.
///
/// # Examples
///
/// ```
/// use trailmark_core::FieldPolicy;
///
/// let policy = FieldPolicy::default().exclude("password");
/// let columns = vec!["id".to_string(), "email".to_string(), "password".to_string()];
/// assert_eq!(policy.effective_fields(&columns, &[]), vec!["id", "email"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldPolicy {
    /// Fields never audited.
    pub blacklist: Vec<String>,

    /// Fields audited; empty means computed from the table.
    pub whitelist: Vec<String>,
}

impl Default for FieldPolicy {
    fn default() -> Self {
        Self {
            blacklist: DEFAULT_BLACKLIST.iter().map(ToString::to_string).collect(),
            whitelist: Vec::new(),
        }
    }
}

impl FieldPolicy {
    /// Creates a policy with the default blacklist and an empty whitelist.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the blacklist.
    #[must_use]
    pub fn with_blacklist<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blacklist = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the whitelist.
    #[must_use]
    pub fn with_whitelist<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a field to the blacklist.
    #[must_use]
    pub fn exclude(mut self, field: impl Into<String>) -> Self {
        self.blacklist.push(field.into());
        self
    }

    /// Adds a field to the whitelist.
    #[must_use]
    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.whitelist.push(field.into());
        self
    }

    /// Resolves the ordered, de-duplicated list of audited fields.
    ///
    /// `columns` are the table's persisted fields and `association_properties`
    /// the properties of the associations touched by the current write; both
    /// are only consulted when the whitelist is empty. Unknown names are kept
    /// as-is and simply never match any data.
    #[must_use]
    pub fn effective_fields(
        &self,
        columns: &[String],
        association_properties: &[String],
    ) -> Vec<String> {
        let candidates: Vec<&String> = if self.whitelist.is_empty() {
            columns.iter().chain(association_properties).collect()
        } else {
            self.whitelist.iter().collect()
        };

        let mut fields: Vec<String> = Vec::new();
        for field in candidates {
            if self.blacklist.contains(field) || fields.contains(field) {
                continue;
            }
            fields.push(field.clone());
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_default_blacklist() {
        let policy = FieldPolicy::default();
        assert_eq!(policy.blacklist, vec!["created", "modified"]);
        assert!(policy.whitelist.is_empty());
    }

    #[test]
    fn test_dynamic_whitelist_includes_association_properties() {
        let policy = FieldPolicy::default();
        let fields = policy.effective_fields(
            &names(&["id", "title", "created", "modified"]),
            &names(&["author"]),
        );
        assert_eq!(fields, vec!["id", "title", "author"]);
    }

    #[test]
    fn test_explicit_whitelist_ignores_columns() {
        let policy = FieldPolicy::default().with_whitelist(["title", "body", "modified"]);
        let fields = policy.effective_fields(&names(&["id", "title"]), &names(&["author"]));
        assert_eq!(fields, vec!["title", "body"]);
    }

    #[test]
    fn test_duplicates_collapse() {
        let policy = FieldPolicy::default().with_whitelist(["title", "title"]);
        assert_eq!(policy.effective_fields(&[], &[]), vec!["title"]);
    }

    #[test]
    fn test_empty_blacklist_override() {
        let policy = FieldPolicy::default().with_blacklist(Vec::<String>::new());
        let fields = policy.effective_fields(&names(&["id", "modified"]), &[]);
        assert_eq!(fields, vec!["id", "modified"]);
    }

    #[test]
    fn test_deserialize_defaults_from_yaml() {
        let policy: FieldPolicy = serde_yaml::from_str("whitelist: [title, body]\n").unwrap();
        assert_eq!(policy.blacklist, vec!["created", "modified"]);
        assert_eq!(policy.whitelist, vec!["title", "body"]);

        let policy: FieldPolicy = serde_yaml::from_str("blacklist: [password]\n").unwrap();
        assert_eq!(policy.blacklist, vec!["password"]);
    }
}
