//! Gamification worker.
//!
//! Applies award events to the ledger. Everything after the ledger commit is
//! best-effort: a leaderboard or notification failure is logged and the job
//! still completes, because a retry would apply the XP a second time.

use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use pulse_core::{AppliedAward, AwardOutcome, Leaderboard, UserLedger};
use pulse_events::{
    GamificationEvent, Job, JobHandler, JobQueue, NotificationEvent, NotificationKind, QueueName,
};
use pulse_telemetry::Metrics;
use serde_json::json;
use tracing::{debug, info, warn};

/// [`JobHandler`] for the gamification queue.
pub struct GamificationWorker {
    ledger: Arc<dyn UserLedger>,
    leaderboard: Arc<dyn Leaderboard>,
    queue: Arc<dyn JobQueue>,
    metrics: Metrics,
}

impl GamificationWorker {
    /// Wire the worker to its ledger, cache and outgoing notification queue.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn UserLedger>,
        leaderboard: Arc<dyn Leaderboard>,
        queue: Arc<dyn JobQueue>,
        metrics: Metrics,
    ) -> Self {
        Self {
            ledger,
            leaderboard,
            queue,
            metrics,
        }
    }

    /// Apply one award event.
    ///
    /// # Errors
    ///
    /// Returns an error only when the ledger update fails; the queue retries
    /// those.
    pub async fn process(&self, event: &GamificationEvent) -> anyhow::Result<AwardOutcome> {
        let outcome = self
            .ledger
            .apply_award(event)
            .await
            .with_context(|| format!("failed to apply award for user {}", event.user_id))?;

        match &outcome {
            AwardOutcome::MissingUser => {
                info!(
                    user_id = %event.user_id,
                    action = %event.action,
                    "award discarded: user no longer exists"
                );
                self.evict(event).await;
            }
            AwardOutcome::Ineligible { role } => {
                debug!(
                    user_id = %event.user_id,
                    action = %event.action,
                    role = %role,
                    "award discarded: role does not earn rewards"
                );
                self.evict(event).await;
            }
            AwardOutcome::Applied(applied) => {
                self.metrics.add_xp_awarded(u64::from(applied.xp_delta));
                if applied.level_change.leveled_up {
                    self.metrics.inc_level_up();
                }
                info!(
                    user_id = %applied.user_id,
                    action = %applied.action,
                    xp_delta = applied.xp_delta,
                    xp = applied.xp,
                    level = applied.level,
                    leveled_up = applied.level_change.leveled_up,
                    "award applied"
                );
                self.refresh_leaderboard(applied).await;
                self.send_notifications(applied).await;
            }
        }
        Ok(outcome)
    }

    async fn refresh_leaderboard(&self, applied: &AppliedAward) {
        if let Err(err) = self
            .leaderboard
            .update_score(applied.user_id, applied.xp)
            .await
        {
            self.metrics.inc_leaderboard_error(err.operation());
            warn!(
                user_id = %applied.user_id,
                error = %err,
                "leaderboard update skipped"
            );
        }
    }

    // The ledger no longer ranks this user, so a cached score must not outlive it.
    async fn evict(&self, event: &GamificationEvent) {
        if let Err(err) = self.leaderboard.remove(event.user_id).await {
            self.metrics.inc_leaderboard_error(err.operation());
            warn!(
                user_id = %event.user_id,
                error = %err,
                "leaderboard eviction skipped"
            );
        }
    }

    async fn send_notifications(&self, applied: &AppliedAward) {
        for notification in award_notifications(applied) {
            let kind = notification.kind;
            if let Err(err) = self.queue.enqueue(Job::Notification(notification)).await {
                warn!(
                    user_id = %applied.user_id,
                    kind = %kind,
                    error = %err,
                    "notification enqueue failed"
                );
            }
        }
    }
}

#[async_trait]
impl JobHandler for GamificationWorker {
    fn queue(&self) -> QueueName {
        QueueName::Gamification
    }

    async fn handle(&self, job: Job) -> anyhow::Result<()> {
        match job {
            Job::Gamification(event) => self.process(&event).await.map(|_| ()),
            Job::Notification(_) => bail!("gamification worker received a notification job"),
        }
    }
}

/// Notifications owed for an applied award: `xp_gained` when XP was granted,
/// then `level_up` when the level changed.
#[must_use]
pub fn award_notifications(applied: &AppliedAward) -> Vec<NotificationEvent> {
    let mut notifications = Vec::with_capacity(2);
    if applied.xp_delta > 0 {
        notifications.push(NotificationEvent {
            user_id: applied.user_id,
            kind: NotificationKind::XpGained,
            title: "XP ganho!".to_string(),
            message: format!(
                "Você ganhou {} XP por {}",
                applied.xp_delta,
                applied.action.label()
            ),
            data: json!({
                "action": applied.action.as_str(),
                "xp": applied.xp_delta,
                "stars": applied.stars_delta,
                "total_xp": applied.xp,
            }),
        });
    }
    if applied.level_change.leveled_up {
        notifications.push(NotificationEvent {
            user_id: applied.user_id,
            kind: NotificationKind::LevelUp,
            title: "Subiu de nível!".to_string(),
            message: format!(
                "Parabéns! Você alcançou o nível {}",
                applied.level_change.new_level
            ),
            data: json!({
                "old_level": applied.level_change.old_level,
                "new_level": applied.level_change.new_level,
                "xp_next_threshold": applied.xp_next_threshold,
            }),
        });
    }
    notifications
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::check_level_up;
    use pulse_events::{Action, AwardContext, MemoryQueue, Reward, Role};
    use pulse_test_support::mocks::{MemoryLeaderboard, MemoryLedger, UnreachableQueue};
    use uuid::Uuid;

    fn applied(xp_delta: u32, old_xp: u64) -> AppliedAward {
        let xp = old_xp + u64::from(xp_delta);
        let level_change = check_level_up(old_xp, xp);
        AppliedAward {
            user_id: Uuid::new_v4(),
            action: Action::AnswerSurvey,
            xp_delta,
            stars_delta: 5,
            xp,
            stars: 5,
            level: level_change.new_level,
            xp_next_threshold: pulse_core::threshold_for(level_change.new_level),
            level_change,
        }
    }

    fn event(user_id: Uuid, xp: u32) -> GamificationEvent {
        GamificationEvent::new(
            user_id,
            Role::Colaborador,
            Action::CompleteTraining,
            Reward { xp, stars: 1 },
            AwardContext::new(),
        )
    }

    #[test]
    fn notifications_follow_xp_and_level_changes() {
        let plain = award_notifications(&applied(50, 0));
        assert_eq!(plain.len(), 1);
        assert_eq!(plain[0].kind, NotificationKind::XpGained);
        assert_eq!(plain[0].message, "Você ganhou 50 XP por responder uma pesquisa");

        let level_up = award_notifications(&applied(600, 0));
        let kinds: Vec<_> = level_up.iter().map(|note| note.kind).collect();
        assert_eq!(kinds, vec![NotificationKind::XpGained, NotificationKind::LevelUp]);
        assert_eq!(level_up[1].data["old_level"], json!(1));
        assert_eq!(level_up[1].data["new_level"], json!(3));

        assert!(award_notifications(&applied(0, 40)).is_empty());
    }

    #[tokio::test]
    async fn cache_and_notification_failures_do_not_fail_the_job() {
        let ledger = Arc::new(MemoryLedger::new());
        let user = Uuid::new_v4();
        ledger.add_user(user, "Ana", Role::Colaborador, 0).await;
        let board = Arc::new(MemoryLeaderboard::new());
        board.set_available(false);
        let metrics = Metrics::new().expect("metrics");
        let worker = GamificationWorker::new(
            ledger.clone(),
            board,
            Arc::new(UnreachableQueue),
            metrics.clone(),
        );

        worker
            .handle(Job::Gamification(event(user, 600)))
            .await
            .expect("job succeeds despite downstream outages");
        assert_eq!(ledger.audit_records().await.len(), 1);
        assert_eq!(metrics.snapshot().level_ups_total, 1);
        assert_eq!(metrics.snapshot().xp_awarded_total, 600);
    }

    #[tokio::test]
    async fn skipped_awards_evict_the_cached_score() {
        let ledger = Arc::new(MemoryLedger::new());
        let board = Arc::new(MemoryLeaderboard::new());
        let (demoted, gone) = (Uuid::new_v4(), Uuid::new_v4());
        ledger.add_user(demoted, "Ana", Role::Colaborador, 900).await;
        board.update_score(demoted, 900).await.expect("score");
        board.update_score(gone, 400).await.expect("score");
        ledger.set_role(demoted, Role::Gestor).await;
        let worker = GamificationWorker::new(
            ledger,
            board.clone(),
            Arc::new(MemoryQueue::new()),
            Metrics::new().expect("metrics"),
        );

        let outcome = worker.process(&event(demoted, 10)).await.expect("processed");
        assert!(matches!(outcome, AwardOutcome::Ineligible { .. }));
        assert_eq!(board.score(demoted).await, None);

        let outcome = worker.process(&event(gone, 10)).await.expect("processed");
        assert_eq!(outcome, AwardOutcome::MissingUser);
        assert!(board.is_empty().await);
    }

    #[tokio::test]
    async fn ledger_failure_is_returned_for_retry() {
        let ledger = Arc::new(MemoryLedger::new());
        let user = Uuid::new_v4();
        ledger.add_user(user, "Bia", Role::Colaborador, 0).await;
        ledger.fail_next(1);
        let queue = Arc::new(MemoryQueue::new());
        let worker = GamificationWorker::new(
            ledger.clone(),
            Arc::new(MemoryLeaderboard::new()),
            queue.clone(),
            Metrics::new().expect("metrics"),
        );

        assert!(worker.process(&event(user, 10)).await.is_err());
        assert!(ledger.audit_records().await.is_empty());
        assert_eq!(queue.pending(QueueName::Notifications).await, 0);
    }

    #[tokio::test]
    async fn wrong_job_kind_is_rejected() {
        let worker = GamificationWorker::new(
            Arc::new(MemoryLedger::new()),
            Arc::new(MemoryLeaderboard::new()),
            Arc::new(MemoryQueue::new()),
            Metrics::new().expect("metrics"),
        );
        let job = Job::Notification(NotificationEvent {
            user_id: Uuid::new_v4(),
            kind: NotificationKind::System,
            title: "t".into(),
            message: "m".into(),
            data: json!({}),
        });
        assert!(worker.handle(job).await.is_err());
    }
}
