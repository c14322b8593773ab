//! Durable job queue abstraction shared by producers and workers.
//!
//! Delivery is at-least-once: a claimed job that is never completed or failed
//! (crashed worker) becomes claimable again once its lease lapses.

mod consumer;
mod memory;
mod retry;

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QueueResult, UnknownLabel};
use crate::payloads::{GamificationEvent, NotificationEvent};

pub use consumer::{Consumer, ConsumerHandle, ConsumerOptions, JobHandler};
pub use memory::MemoryQueue;
pub use retry::{Backoff, RetryDecision, RetryPolicy};

/// Identifier assigned to a job at enqueue time.
pub type JobId = i64;

/// Named queues used by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    /// Award requests consumed by the gamification worker.
    Gamification,
    /// Notification requests consumed by the notification worker.
    Notifications,
}

impl QueueName {
    /// Storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gamification => "gamification",
            Self::Notifications => "notifications",
        }
    }
}

impl Display for QueueName {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "gamification" => Ok(Self::Gamification),
            "notifications" => Ok(Self::Notifications),
            other => Err(UnknownLabel {
                kind: "queue",
                value: other.to_string(),
            }),
        }
    }
}

/// A unit of work on one of the pipeline queues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Job {
    /// Credit XP and stars to a user.
    Gamification(GamificationEvent),
    /// Persist a notification for a user.
    Notification(NotificationEvent),
}

impl Job {
    /// Queue this job belongs on.
    #[must_use]
    pub const fn queue(&self) -> QueueName {
        match self {
            Self::Gamification(_) => QueueName::Gamification,
            Self::Notification(_) => QueueName::Notifications,
        }
    }

    /// Short machine-friendly discriminator used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Gamification(_) => "gamification",
            Self::Notification(_) => "notification",
        }
    }
}

/// Job handed to a worker together with its delivery metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedJob {
    /// Queue-assigned identifier.
    pub id: JobId,
    /// One-based delivery attempt.
    pub attempt: u32,
    /// Payload.
    pub job: Job,
}

/// What happened to a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobDisposition {
    /// The job will be delivered again.
    Retrying {
        /// Attempt that just failed.
        attempt: u32,
        /// Earliest time of the next delivery.
        run_at: DateTime<Utc>,
    },
    /// Retries are exhausted; the job is parked as failed.
    Failed {
        /// Total attempts made.
        attempts: u32,
    },
}

/// Storage-agnostic queue contract.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append a job to its queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot persist the job.
    async fn enqueue(&self, job: Job) -> QueueResult<JobId>;

    /// Lease up to `limit` ready jobs from `queue`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be queried.
    async fn claim(&self, queue: QueueName, limit: usize) -> QueueResult<Vec<ClaimedJob>>;

    /// Mark a claimed job as done.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::UnknownJob`](crate::QueueError::UnknownJob) when the
    /// job is not currently claimed, or a backend error.
    async fn complete(&self, id: JobId) -> QueueResult<()>;

    /// Record a failed attempt and reschedule or park the job per `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::UnknownJob`](crate::QueueError::UnknownJob) when the
    /// job is not currently claimed, or a backend error.
    async fn fail(&self, id: JobId, error: &str, policy: &RetryPolicy)
    -> QueueResult<JobDisposition>;

    /// Block until work may be available on `queue` or `timeout` elapses.
    async fn wait_for_work(&self, queue: QueueName, timeout: Duration) {
        let _ = queue;
        tokio::time::sleep(timeout).await;
    }
}
