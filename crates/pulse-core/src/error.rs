//! Error types for the leaderboard seam.

use std::error::Error;

use thiserror::Error;

/// Failures surfaced by leaderboard cache adapters.
///
/// Every variant means "no answer"; it is never conflated with an empty board.
#[derive(Debug, Error)]
pub enum LeaderboardError {
    /// The cache cannot be reached, is disabled, or is cooling down after
    /// repeated connection failures.
    #[error("leaderboard cache unavailable")]
    Unavailable {
        /// Operation identifier.
        operation: &'static str,
        /// Human-readable reason.
        detail: String,
    },
    /// A command reached the cache but failed.
    #[error("leaderboard command failed")]
    Command {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying client error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The cache returned data that does not decode.
    #[error("leaderboard returned malformed data")]
    Malformed {
        /// Operation identifier.
        operation: &'static str,
        /// Offending value.
        detail: String,
    },
}

impl LeaderboardError {
    /// Operation that failed.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Unavailable { operation, .. }
            | Self::Command { operation, .. }
            | Self::Malformed { operation, .. } => *operation,
        }
    }
}

/// Convenience alias for leaderboard results.
pub type LeaderboardResult<T> = Result<T, LeaderboardError>;
