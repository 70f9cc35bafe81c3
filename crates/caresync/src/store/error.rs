//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during local storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Record not found.
    #[error("not found: {table}/{id}")]
    NotFound { table: &'static str, id: i64 },

    /// Payload is missing a field the table requires (e.g. a natural key).
    #[error("invalid payload for table {table}: {reason}")]
    InvalidPayload { table: &'static str, reason: String },

    /// Payload (de)serialization failed.
    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (database directory handling).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database migration failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::NotFound {
            table: "messages",
            id: 7,
        };
        assert_eq!(err.to_string(), "not found: messages/7");
    }
}
