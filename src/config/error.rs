//! Configuration Error Types
//!
//! Specific, actionable error messages for configuration loading and validation.

use thiserror::Error;

/// Configuration-related errors with detailed context
#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// Failure while reading or merging configuration sources
    #[error("Failed to load configuration from {source_name}: {error}")]
    Load { source_name: String, error: String },
}

impl ConfigurationError {
    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl ToString,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            context: context.into(),
        }
    }

    /// Create a load error from any displayable source error
    pub fn load(source_name: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::Load {
            source_name: source_name.into(),
            error: error.to_string(),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;
