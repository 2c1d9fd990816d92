//! Store error types
//!
//! One taxonomy shared by every subsystem. Compiler-detected problems are
//! raised before any remote call; presence and ETag failures are raised by
//! the guard step of a write script, before any mutation runs.

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    // ==================
    // Write outcomes
    // ==================
    /// Duplicate identity on insert, or ETag mismatch on update/delete
    #[error("Conflict")]
    Conflict,

    /// Target record absent
    #[error("Not Found")]
    NotFound,

    // ==================
    // Compile-time rejections
    // ==================
    /// Unsupported predicate, sort or field combination
    #[error("Not Implemented: {0}")]
    NotImplemented(String),

    /// Predicate references a field that carries no index
    #[error("Field '{0}' is not filterable")]
    UnindexedField(String),

    /// Sort references a field that is not stored for sorting
    #[error("Field '{0}' is not sortable")]
    UnsortableField(String),

    /// Value of the wrong shape for its field
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    // ==================
    // Engine and transport
    // ==================
    /// Remote response shape does not match the compiled script
    #[error("Malformed result: {0}")]
    MalformedResult(String),

    /// Payload blob could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// Network or remote engine failure, surfaced verbatim
    #[error("Transport error: {0}")]
    Transport(String),

    /// Caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Operation deadline elapsed
    #[error("Operation timed out")]
    Timeout,
}

impl StoreError {
    /// Create a not implemented error
    pub fn not_implemented(reason: impl Into<String>) -> Self {
        Self::NotImplemented(reason.into())
    }

    /// Create an invalid value error
    pub fn invalid_value(reason: impl Into<String>) -> Self {
        Self::InvalidValue(reason.into())
    }

    /// Create a malformed result error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedResult(reason.into())
    }

    /// Stable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Conflict => "DOCDEX_CONFLICT",
            StoreError::NotFound => "DOCDEX_NOT_FOUND",
            StoreError::NotImplemented(_) => "DOCDEX_NOT_IMPLEMENTED",
            StoreError::UnindexedField(_) => "DOCDEX_UNINDEXED_FIELD",
            StoreError::UnsortableField(_) => "DOCDEX_UNSORTABLE_FIELD",
            StoreError::InvalidValue(_) => "DOCDEX_INVALID_VALUE",
            StoreError::MalformedResult(_) => "DOCDEX_MALFORMED_RESULT",
            StoreError::Codec(_) => "DOCDEX_CODEC",
            StoreError::Transport(_) => "DOCDEX_TRANSPORT",
            StoreError::Cancelled => "DOCDEX_CANCELLED",
            StoreError::Timeout => "DOCDEX_TIMEOUT",
        }
    }

    /// Returns true if the caller's request caused this error
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict
                | StoreError::NotFound
                | StoreError::NotImplemented(_)
                | StoreError::UnindexedField(_)
                | StoreError::UnsortableField(_)
                | StoreError::InvalidValue(_)
        )
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec(e.to_string())
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        Self::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(StoreError::Conflict.code(), "DOCDEX_CONFLICT");
        assert_eq!(StoreError::NotFound.code(), "DOCDEX_NOT_FOUND");
        assert_eq!(
            StoreError::not_implemented("multi sort").code(),
            "DOCDEX_NOT_IMPLEMENTED"
        );
        assert_eq!(StoreError::Timeout.code(), "DOCDEX_TIMEOUT");
    }

    #[test]
    fn test_error_display() {
        assert_eq!(StoreError::Conflict.to_string(), "Conflict");
        let err = StoreError::UnindexedField("age".into());
        assert!(err.to_string().contains("age"));
    }

    #[test]
    fn test_client_errors() {
        assert!(StoreError::Conflict.is_client_error());
        assert!(StoreError::invalid_value("x").is_client_error());
        assert!(!StoreError::Transport("reset".into()).is_client_error());
        assert!(!StoreError::Cancelled.is_client_error());
    }

    #[test]
    fn test_from_serde_json() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(StoreError::from(err), StoreError::Codec(_)));
    }
}
