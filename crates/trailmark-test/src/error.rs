//! Error types for the in-memory store.

use thiserror::Error;
use trailmark_core::AuditError;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while reading or writing the in-memory store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The table was never defined.
    #[error("Unknown table: {table}")]
    UnknownTable {
        /// Table name.
        table: String,
    },

    /// The association is not declared on the table.
    #[error("Unknown association {association} on {table}")]
    UnknownAssociation {
        /// Table name.
        table: String,
        /// Association name.
        association: String,
    },

    /// No row matches the given key.
    #[error("Record not found in {table}: {key}")]
    NotFound {
        /// Table name.
        table: String,
        /// Primary key, rendered as JSON.
        key: String,
    },

    /// A write was rejected; the whole operation was rolled back.
    #[error("Write to {table} failed")]
    WriteFailed {
        /// Table name.
        table: String,
    },

    /// The write committed but its audit batch could not be delivered.
    #[error("Audit delivery failed: {0}")]
    Audit(#[from] AuditError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = StoreError::NotFound {
            table: "articles".to_string(),
            key: "{\"id\":99}".to_string(),
        };
        assert_eq!(err.to_string(), "Record not found in articles: {\"id\":99}");
    }

    #[test]
    fn test_error_display_write_failed() {
        let err = StoreError::WriteFailed {
            table: "comments".to_string(),
        };
        assert_eq!(err.to_string(), "Write to comments failed");
    }
}
