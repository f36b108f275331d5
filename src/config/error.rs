//! Configuration Error Types

use thiserror::Error;

/// Configuration-related errors with enough context to fix the input
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A source (file or environment) could not be read or parsed
    #[error("Failed to load configuration from {source_name}: {error}")]
    SourceError { source_name: String, error: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },
}

impl ConfigurationError {
    pub fn source_error(source_name: impl Into<String>, error: impl ToString) -> Self {
        Self::SourceError {
            source_name: source_name.into(),
            error: error.to_string(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
