// crates/recall-store/src/error.rs
// Error taxonomy for the Recall store

use thiserror::Error;

/// Main error type for the Recall library
#[derive(Error, Debug)]
pub enum RecallError {
    #[error("store not initialized: call setup() first")]
    NotInitialized,

    #[error("unsupported filter operator: {0}")]
    UnsupportedOperator(String),

    #[error("unsupported match type: {0}")]
    UnsupportedMatchType(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("task cancelled")]
    Cancelled,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience type alias for Result using RecallError
pub type Result<T> = std::result::Result<T, RecallError>;

impl RecallError {
    /// True for SQLITE_BUSY / SQLITE_LOCKED, the only errors the store retries.
    pub fn is_contention(&self) -> bool {
        match self {
            RecallError::Db(err) => crate::db::is_rusqlite_contention(err),
            RecallError::Anyhow(err) => err
                .downcast_ref::<rusqlite::Error>()
                .is_some_and(crate::db::is_rusqlite_contention),
            _ => false,
        }
    }
}

impl From<deadpool_sqlite::InteractError> for RecallError {
    fn from(err: deadpool_sqlite::InteractError) -> Self {
        match err {
            deadpool_sqlite::InteractError::Aborted => RecallError::Cancelled,
            deadpool_sqlite::InteractError::Panic(_) => {
                RecallError::Storage("database task panicked".into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================================
    // Display
    // ============================================================================

    #[test]
    fn test_not_initialized_error() {
        let err = RecallError::NotInitialized;
        assert!(err.to_string().contains("not initialized"));
    }

    #[test]
    fn test_unsupported_operator_error() {
        let err = RecallError::UnsupportedOperator("$regex".to_string());
        assert!(err.to_string().contains("unsupported filter operator"));
        assert!(err.to_string().contains("$regex"));
    }

    #[test]
    fn test_dimension_mismatch_error() {
        let err = RecallError::DimensionMismatch {
            expected: 1536,
            actual: 768,
        };
        let msg = err.to_string();
        assert!(msg.contains("1536"));
        assert!(msg.contains("768"));
    }

    #[test]
    fn test_embedding_error() {
        let err = RecallError::Embedding("rate limited".to_string());
        assert!(err.to_string().contains("embedding error"));
        assert!(err.to_string().contains("rate limited"));
    }

    // ============================================================================
    // From implementations
    // ============================================================================

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RecallError = io_err.into();
        assert!(matches!(err, RecallError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_from_interact_error() {
        let err: RecallError = deadpool_sqlite::InteractError::Aborted.into();
        assert!(matches!(err, RecallError::Cancelled));

        let err: RecallError = deadpool_sqlite::InteractError::Panic(Box::new("boom")).into();
        assert!(matches!(err, RecallError::Storage(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<i32>("not json").unwrap_err();
        let err: RecallError = json_err.into();
        assert!(matches!(err, RecallError::Json(_)));
    }

    // ============================================================================
    // Contention detection
    // ============================================================================

    #[test]
    fn test_contention_detection() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(RecallError::Db(busy).is_contention());

        let locked = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
            None,
        );
        assert!(RecallError::Anyhow(anyhow::Error::new(locked)).is_contention());

        assert!(!RecallError::Db(rusqlite::Error::QueryReturnedNoRows).is_contention());
        assert!(!RecallError::Storage("x".into()).is_contention());
    }

    #[test]
    fn test_result_err() {
        let result: Result<i32> = Err(RecallError::NotInitialized);
        assert!(result.is_err());
    }
}
