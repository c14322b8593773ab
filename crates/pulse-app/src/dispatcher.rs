//! Award-XP dispatcher.
//!
//! Route handlers call [`AwardDispatcher::award_xp`] after their own work has
//! succeeded. The call only enqueues a gamification job; it never waits on the
//! ledger, and it never reports a failure the caller has to handle.

use std::sync::Arc;
use std::time::Duration;

use pulse_events::{
    Action, AwardContext, GamificationEvent, Job, JobId, JobQueue, Reward, Role, UserId,
};
use pulse_telemetry::Metrics;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Input to [`AwardDispatcher::award_xp`].
#[derive(Debug, Clone, PartialEq)]
pub struct AwardRequest {
    /// Recipient.
    pub user_id: UserId,
    /// Role the caller believes the user holds.
    pub role: Role,
    /// What the user did.
    pub action: Action,
    /// XP and stars to grant.
    pub reward: Reward,
    /// Free-form details copied to the audit trail.
    pub context: AwardContext,
}

impl AwardRequest {
    /// Request granting the action's default reward with an empty context.
    #[must_use]
    pub fn new(user_id: UserId, role: Role, action: Action) -> Self {
        Self {
            user_id,
            role,
            action,
            reward: action.default_reward(),
            context: AwardContext::new(),
        }
    }

    /// Override the reward.
    #[must_use]
    pub const fn with_reward(mut self, reward: Reward) -> Self {
        self.reward = reward;
        self
    }

    /// Attach audit context.
    #[must_use]
    pub fn with_context(mut self, context: AwardContext) -> Self {
        self.context = context;
        self
    }
}

/// What happened to an award request. Callers are free to ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    /// The gamification job was accepted by the queue.
    Enqueued(JobId),
    /// The role does not earn rewards; nothing was sent.
    Ineligible(Role),
    /// The queue could not be reached in time; the award is lost.
    Dropped,
}

impl DispatchStatus {
    /// Metric label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enqueued(_) => "enqueued",
            Self::Ineligible(_) => "ineligible",
            Self::Dropped => "dropped",
        }
    }
}

/// Turns award requests into gamification jobs.
#[derive(Clone)]
pub struct AwardDispatcher {
    queue: Arc<dyn JobQueue>,
    metrics: Metrics,
    enqueue_timeout: Duration,
}

impl AwardDispatcher {
    /// Build a dispatcher that gives up on an enqueue after `enqueue_timeout`.
    #[must_use]
    pub fn new(queue: Arc<dyn JobQueue>, metrics: Metrics, enqueue_timeout: Duration) -> Self {
        Self {
            queue,
            metrics,
            enqueue_timeout,
        }
    }

    /// Schedule an award.
    ///
    /// Non-colaborador roles are skipped without touching the queue. Queue
    /// errors and timeouts are logged and reported as [`DispatchStatus::Dropped`].
    pub async fn award_xp(&self, request: AwardRequest) -> DispatchStatus {
        let status = self.dispatch(request).await;
        self.metrics.inc_award_dispatch(status.as_str());
        status
    }

    async fn dispatch(&self, request: AwardRequest) -> DispatchStatus {
        let AwardRequest {
            user_id,
            role,
            action,
            reward,
            context,
        } = request;

        if !role.earns_rewards() {
            debug!(user_id = %user_id, role = %role, action = %action, "award skipped for role");
            return DispatchStatus::Ineligible(role);
        }

        let event = GamificationEvent::new(user_id, role, action, reward, context);
        match timeout(self.enqueue_timeout, self.queue.enqueue(Job::Gamification(event))).await {
            Ok(Ok(job_id)) => {
                debug!(
                    user_id = %user_id,
                    action = %action,
                    xp = reward.xp,
                    stars = reward.stars,
                    job_id,
                    "award enqueued"
                );
                DispatchStatus::Enqueued(job_id)
            }
            Ok(Err(err)) => {
                warn!(
                    user_id = %user_id,
                    action = %action,
                    error = %err,
                    "gamification queue unavailable; award dropped"
                );
                DispatchStatus::Dropped
            }
            Err(_) => {
                warn!(
                    user_id = %user_id,
                    action = %action,
                    timeout_ms = u64::try_from(self.enqueue_timeout.as_millis()).unwrap_or(u64::MAX),
                    "gamification enqueue timed out; award dropped"
                );
                DispatchStatus::Dropped
            }
        }
    }
}
