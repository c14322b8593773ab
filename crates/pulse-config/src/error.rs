//! Error types for configuration loading.

use thiserror::Error;

/// Primary error type for configuration loading.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable was not set.
    #[error("missing required configuration")]
    Missing {
        /// Environment variable name.
        field: &'static str,
    },
    /// A variable was set to an unusable value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Environment variable name.
        field: &'static str,
        /// Offending value.
        value: String,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
}

impl ConfigError {
    /// Variable the error refers to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::Missing { field } | Self::InvalidField { field, .. } => *field,
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
