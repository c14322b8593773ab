//! Telemetry errors.

use std::string::FromUtf8Error;

use thiserror::Error;
use tracing_subscriber::util::TryInitError;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Failures while installing logging or maintaining the metrics registry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global tracing subscriber was already installed.
    #[error("tracing subscriber could not be installed")]
    Subscriber {
        /// Error from `tracing-subscriber`.
        #[source]
        source: TryInitError,
    },
    /// A collector could not be created or added to the registry.
    #[error("metric {name} could not be {operation}")]
    Metric {
        /// Fully qualified metric name.
        name: &'static str,
        /// Either `built` or `registered`.
        operation: &'static str,
        /// Error from the Prometheus client.
        #[source]
        source: prometheus::Error,
    },
    /// The text exposition could not be produced.
    #[error("metrics exposition could not be encoded")]
    Exposition {
        /// Error from the text encoder.
        #[source]
        source: prometheus::Error,
    },
    /// The encoder emitted bytes that are not valid UTF-8.
    #[error("metrics exposition is not utf-8")]
    ExpositionUtf8 {
        /// Conversion error holding the raw bytes.
        #[source]
        source: FromUtf8Error,
    },
}

impl TelemetryError {
    pub(crate) const fn metric(
        name: &'static str,
        operation: &'static str,
        source: prometheus::Error,
    ) -> Self {
        Self::Metric {
            name,
            operation,
            source,
        }
    }
}
