//! # Design
//!
//! - Centralize worker-level errors for bootstrap and shutdown.
//! - Keep error messages constant while carrying context fields for debugging.

use std::io;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: pulse_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: pulse_telemetry::TelemetryError,
    },
    /// Database setup failed.
    #[error("data operation failed")]
    Data {
        /// Operation identifier.
        operation: &'static str,
        /// Source data-layer error.
        source: pulse_data::DataError,
    },
    /// Leaderboard cache client could not be built.
    #[error("leaderboard cache operation failed")]
    Cache {
        /// Operation identifier.
        operation: &'static str,
        /// Source cache error.
        source: pulse_core::LeaderboardError,
    },
    /// Waiting for the shutdown signal failed.
    #[error("signal handling failed")]
    Signal {
        /// Source IO error.
        source: io::Error,
    },
}

impl AppError {
    pub(crate) const fn config(operation: &'static str, source: pulse_config::ConfigError) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: pulse_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn data(operation: &'static str, source: pulse_data::DataError) -> Self {
        Self::Data { operation, source }
    }

    pub(crate) const fn cache(
        operation: &'static str,
        source: pulse_core::LeaderboardError,
    ) -> Self {
        Self::Cache { operation, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn app_error_helpers_build_variants() {
        let config = AppError::config(
            "config.from_env",
            pulse_config::ConfigError::Missing {
                field: "DATABASE_URL",
            },
        );
        assert!(matches!(config, AppError::Config { .. }));
        assert_eq!(config.to_string(), "configuration operation failed");
        assert!(config.source().is_some());

        let cache = AppError::cache(
            "cache.open",
            pulse_core::LeaderboardError::Unavailable {
                operation: "open",
                detail: "bad url".into(),
            },
        );
        assert!(matches!(cache, AppError::Cache { .. }));
    }
}
