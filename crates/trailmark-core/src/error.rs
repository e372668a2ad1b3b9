//! Error types for audit capture and delivery.
//!
//! Capture itself never fails: empty diffs, missing queues and misconfigured
//! field lists are normal outcomes. Only delivery to a persister can fail.

use thiserror::Error;

use crate::context::TransactionId;

/// Result type alias using [`AuditError`] as the error type.
pub type Result<T> = std::result::Result<T, AuditError>;

/// Errors reported by a [`Persister`](crate::Persister).
#[derive(Debug, Error)]
pub enum PersistError {
    /// Serialization error
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific error
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Errors surfaced to the host from the commit path.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The persister rejected a committed batch.
    #[error("Persister '{persister}' failed to log {count} event(s) for {source_name} (transaction {transaction}): {source}")]
    DeliveryFailed {
        /// Name of the persister that failed.
        persister: &'static str,
        /// Source that triggered the flush.
        source_name: String,
        /// Transaction the batch belongs to.
        transaction: TransactionId,
        /// Number of events in the rejected batch.
        count: usize,
        /// Underlying persister error.
        #[source]
        source: PersistError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_error_display_backend() {
        let err = PersistError::Backend("index unavailable".to_string());
        assert_eq!(err.to_string(), "Backend error: index unavailable");
    }

    #[test]
    fn test_delivery_failed_display() {
        let transaction = TransactionId::new();
        let err = AuditError::DeliveryFailed {
            persister: "in_memory",
            source_name: "articles".to_string(),
            transaction,
            count: 3,
            source: PersistError::Backend("down".to_string()),
        };

        let message = err.to_string();
        assert!(message.contains("'in_memory'"));
        assert!(message.contains("3 event(s) for articles"));
        assert!(message.contains(&transaction.to_string()));
        assert!(message.ends_with("Backend error: down"));
    }
}
