//! Cache error types
//!
//! Errors never cross the host boundary: [`crate::cache::fail_open`] converts
//! every variant into a miss or a no-op. They exist so the internals can use
//! `?` and so the logs can say what kind of failure happened.

use thiserror::Error;

/// Errors that can occur inside the cache handler
#[derive(Debug, Error)]
pub enum CacheError {
    /// The store is unreachable, refused the connection, or dropped it
    #[error("Cache connection error: {0}")]
    ConnectionError(String),

    /// A stored payload could not be encoded or decoded
    #[error("Cache serialization error: {0}")]
    SerializationError(String),

    /// An individual store command failed
    #[error("Cache operation error: {0}")]
    OperationError(String),

    /// The handler was built from an unusable configuration
    #[error("Cache configuration error: {0}")]
    ConfigurationError(String),
}

impl CacheError {
    /// Short label used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionError(_) => "connection",
            Self::SerializationError(_) => "serialization",
            Self::OperationError(_) => "operation",
            Self::ConfigurationError(_) => "configuration",
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}

impl From<crate::config::ConfigurationError> for CacheError {
    fn from(e: crate::config::ConfigurationError) -> Self {
        CacheError::ConfigurationError(e.to_string())
    }
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_errors_are_serialization_errors() {
        let err: CacheError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), "serialization");
        assert!(err.to_string().starts_with("Cache serialization error"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(CacheError::ConnectionError("x".into()).kind(), "connection");
        assert_eq!(CacheError::OperationError("x".into()).kind(), "operation");
        assert_eq!(
            CacheError::ConfigurationError("x".into()).kind(),
            "configuration"
        );
    }
}
