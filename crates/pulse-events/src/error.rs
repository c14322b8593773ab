//! Queue error primitives.

use std::error::Error;
use std::time::Duration;

use thiserror::Error;

use crate::queue::JobId;

/// Errors raised by queue backends.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue backend could not be reached or rejected the operation.
    #[error("queue unavailable")]
    Unavailable {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying transport failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The queue did not answer within the allotted time.
    #[error("queue operation timed out")]
    Timeout {
        /// Operation identifier.
        operation: &'static str,
        /// Time waited before giving up.
        after: Duration,
    },
    /// A job payload could not be encoded or decoded.
    #[error("job payload serialization failed")]
    Serialization {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// The referenced job does not exist (or is no longer claimable).
    #[error("unknown job")]
    UnknownJob {
        /// Identifier supplied by the caller.
        job_id: JobId,
    },
}

impl QueueError {
    /// Wrap a transport error as an availability failure.
    pub fn unavailable(
        operation: &'static str,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self::Unavailable {
            operation,
            source: source.into(),
        }
    }
}

/// Result wrapper for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Raised when a stored or transmitted label does not map to a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} label")]
pub struct UnknownLabel {
    /// Kind of label being parsed (e.g. `role`).
    pub kind: &'static str,
    /// Offending value.
    pub value: String,
}
