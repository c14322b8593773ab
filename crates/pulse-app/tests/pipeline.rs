use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use pulse_app::{
    AwardDispatcher, AwardRequest, DispatchStatus, Pipeline, PipelineDeps, PipelineOptions,
};
use pulse_core::{RankingSource, UserLedger};
use pulse_events::{
    Action, AwardContext, Backoff, MemoryQueue, NotificationKind, QueueName, Reward, RetryPolicy,
    Role,
};
use pulse_telemetry::Metrics;
use pulse_test_support::mocks::{MemoryLeaderboard, MemoryLedger, MemoryNotifications};
use uuid::Uuid;

struct Harness {
    ledger: Arc<MemoryLedger>,
    board: Arc<MemoryLeaderboard>,
    notes: Arc<MemoryNotifications>,
    queue: Arc<MemoryQueue>,
    metrics: Metrics,
}

impl Harness {
    fn new() -> Result<Self> {
        Ok(Self {
            ledger: Arc::new(MemoryLedger::new()),
            board: Arc::new(MemoryLeaderboard::new()),
            notes: Arc::new(MemoryNotifications::new()),
            queue: Arc::new(MemoryQueue::new()),
            metrics: Metrics::new()?,
        })
    }

    fn options() -> PipelineOptions {
        let mut options = PipelineOptions::default();
        options.gamification.poll_interval = Duration::from_millis(10);
        options.gamification.retry = RetryPolicy {
            max_attempts: 3,
            backoff: Backoff::Exponential {
                base: Duration::from_millis(10),
            },
        };
        options.notifications.poll_interval = Duration::from_millis(10);
        options.dispatch_timeout = Duration::from_millis(200);
        options
    }

    fn start(&self) -> Pipeline {
        Pipeline::start(
            PipelineDeps {
                ledger: self.ledger.clone(),
                leaderboard: self.board.clone(),
                notifications: self.notes.clone(),
                queue: self.queue.clone(),
                metrics: self.metrics.clone(),
            },
            Self::options(),
        )
    }

    fn dispatcher(&self) -> AwardDispatcher {
        AwardDispatcher::new(
            self.queue.clone(),
            self.metrics.clone(),
            Duration::from_millis(200),
        )
    }

    async fn settled(&self, completed: usize) -> Result<()> {
        let queue = self.queue.clone();
        eventually(move || {
            let queue = queue.clone();
            async move {
                queue.completed_count().await >= completed
                    && queue.pending(QueueName::Gamification).await == 0
                    && queue.pending(QueueName::Notifications).await == 0
            }
        })
        .await
    }
}

async fn eventually<F, Fut>(mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bail!("condition not reached within 5s")
}

fn training(user_id: Uuid, xp: u32) -> AwardRequest {
    AwardRequest::new(user_id, Role::Colaborador, Action::CompleteTraining)
        .with_reward(Reward { xp, stars: 2 })
        .with_context(AwardContext::new().with("course_id", "onboarding"))
}

#[tokio::test]
async fn first_award_levels_up_and_notifies_twice() -> Result<()> {
    let harness = Harness::new()?;
    let user = Uuid::new_v4();
    harness
        .ledger
        .add_user(user, "Ana", Role::Colaborador, 0)
        .await;
    let pipeline = harness.start();

    let status = pipeline.dispatcher().award_xp(training(user, 600)).await;
    assert!(matches!(status, DispatchStatus::Enqueued(_)));
    // one gamification job, two notification jobs
    harness.settled(3).await?;
    pipeline.shutdown().await;

    let entry = harness.ledger.entry(user).await?.expect("user exists");
    assert_eq!((entry.xp, entry.stars, entry.level), (600, 2, 3));
    assert_eq!(entry.xp_next_threshold, 1_500);

    let audit = harness.ledger.audit_records().await;
    assert_eq!(audit.len(), 1);
    assert!(audit[0].leveled_up);
    assert_eq!((audit[0].old_level, audit[0].new_level), (1, 3));

    let kinds: Vec<_> = harness
        .notes
        .stored()
        .await
        .iter()
        .map(|note| note.kind)
        .collect();
    assert_eq!(kinds.len(), 2);
    assert!(kinds.contains(&NotificationKind::XpGained));
    assert!(kinds.contains(&NotificationKind::LevelUp));

    assert_eq!(harness.board.score(user).await, Some(600));
    let snapshot = harness.metrics.snapshot();
    assert_eq!(snapshot.level_ups_total, 1);
    assert_eq!(snapshot.xp_awarded_total, 600);
    Ok(())
}

#[tokio::test]
async fn manager_award_never_reaches_the_ledger() -> Result<()> {
    let harness = Harness::new()?;
    let manager = Uuid::new_v4();
    harness
        .ledger
        .add_user(manager, "Bruno", Role::Gestor, 120)
        .await;
    let pipeline = harness.start();

    let request = AwardRequest::new(manager, Role::Gestor, Action::GiveFeedback)
        .with_reward(Reward { xp: 50, stars: 5 });
    assert_eq!(
        pipeline.dispatcher().award_xp(request).await,
        DispatchStatus::Ineligible(Role::Gestor)
    );
    pipeline.shutdown().await;

    assert_eq!(harness.queue.pending(QueueName::Gamification).await, 0);
    assert_eq!(harness.queue.completed_count().await, 0);
    let entry = harness.ledger.entry(manager).await?.expect("user exists");
    assert_eq!(entry.xp, 120);
    assert!(harness.ledger.audit_records().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn stored_role_is_authoritative() -> Result<()> {
    let harness = Harness::new()?;
    let user = Uuid::new_v4();
    harness
        .ledger
        .add_user(user, "Carla", Role::Colaborador, 10)
        .await;

    let status = harness.dispatcher().award_xp(training(user, 100)).await;
    assert!(matches!(status, DispatchStatus::Enqueued(_)));
    harness.ledger.set_role(user, Role::Gestor).await;

    let pipeline = harness.start();
    harness.settled(1).await?;
    pipeline.shutdown().await;

    let entry = harness.ledger.entry(user).await?.expect("user exists");
    assert_eq!(entry.xp, 10);
    assert!(harness.ledger.audit_records().await.is_empty());
    assert!(harness.notes.stored().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn award_for_deleted_user_completes_quietly() -> Result<()> {
    let harness = Harness::new()?;
    let user = Uuid::new_v4();
    harness
        .ledger
        .add_user(user, "Davi", Role::Colaborador, 0)
        .await;

    let status = harness.dispatcher().award_xp(training(user, 80)).await;
    assert!(matches!(status, DispatchStatus::Enqueued(_)));
    harness.ledger.remove_user(user).await;

    let pipeline = harness.start();
    harness.settled(1).await?;
    pipeline.shutdown().await;

    assert!(harness.queue.failed_jobs().await.is_empty());
    assert!(harness.ledger.audit_records().await.is_empty());
    assert!(harness.notes.stored().await.is_empty());
    assert_eq!(harness.queue.pending(QueueName::Notifications).await, 0);
    assert!(harness.board.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn concurrent_awards_for_one_user_all_land() -> Result<()> {
    let harness = Harness::new()?;
    let user = Uuid::new_v4();
    harness
        .ledger
        .add_user(user, "Eva", Role::Colaborador, 50)
        .await;
    let pipeline = harness.start();

    let dispatcher = pipeline.dispatcher().clone();
    let mut sends = Vec::new();
    for xp in 1..=20_u32 {
        let dispatcher = dispatcher.clone();
        sends.push(tokio::spawn(async move {
            dispatcher.award_xp(training(user, xp)).await
        }));
    }
    for send in sends {
        assert!(matches!(send.await?, DispatchStatus::Enqueued(_)));
    }

    let ledger = harness.ledger.clone();
    eventually(move || {
        let ledger = ledger.clone();
        async move { ledger.audit_records().await.len() == 20 }
    })
    .await?;
    harness.settled(20).await?;
    pipeline.shutdown().await;

    let expected = 50 + (1..=20).sum::<u64>();
    let entry = harness.ledger.entry(user).await?.expect("user exists");
    assert_eq!(entry.xp, expected);
    assert_eq!(entry.stars, 40);
    assert_eq!(entry.level, pulse_core::level_of(expected));
    assert_eq!(entry.xp_next_threshold, pulse_core::threshold_for(entry.level));
    Ok(())
}

#[tokio::test]
async fn transient_ledger_failure_is_retried_once_applied() -> Result<()> {
    let harness = Harness::new()?;
    let user = Uuid::new_v4();
    harness
        .ledger
        .add_user(user, "Fábio", Role::Colaborador, 0)
        .await;
    harness.ledger.fail_next(2);
    let pipeline = harness.start();

    pipeline.dispatcher().award_xp(training(user, 30)).await;
    let ledger = harness.ledger.clone();
    eventually(move || {
        let ledger = ledger.clone();
        async move { ledger.audit_records().await.len() == 1 }
    })
    .await?;
    harness.settled(2).await?;
    pipeline.shutdown().await;

    assert_eq!(harness.ledger.entry(user).await?.map(|entry| entry.xp), Some(30));
    assert_eq!(harness.metrics.jobs("gamification", "retried"), 2);
    assert!(harness.queue.failed_jobs().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn persistent_ledger_failure_parks_the_job() -> Result<()> {
    let harness = Harness::new()?;
    let user = Uuid::new_v4();
    harness
        .ledger
        .add_user(user, "Gabi", Role::Colaborador, 0)
        .await;
    harness.ledger.fail_next(10);
    let pipeline = harness.start();

    pipeline.dispatcher().award_xp(training(user, 30)).await;
    let queue = harness.queue.clone();
    eventually(move || {
        let queue = queue.clone();
        async move { queue.failed_jobs().await.len() == 1 }
    })
    .await?;
    pipeline.shutdown().await;

    assert_eq!(harness.ledger.entry(user).await?.map(|entry| entry.xp), Some(0));
    assert!(harness.notes.stored().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn ranking_survives_cache_outage() -> Result<()> {
    let harness = Harness::new()?;
    let user = Uuid::new_v4();
    harness
        .ledger
        .add_user(user, "Hugo", Role::Colaborador, 700)
        .await;
    harness
        .ledger
        .add_user(Uuid::new_v4(), "Iris", Role::Colaborador, 900)
        .await;
    harness.board.set_available(false);
    let pipeline = harness.start();

    let page = pipeline.ranking().global_ranking(0, 50, user).await?;
    pipeline.shutdown().await;

    assert_eq!(page.source, RankingSource::Ledger);
    assert_eq!(page.current_user_rank, None);
    let names: Vec<_> = page.ranking.iter().map(|row| row.name.as_str()).collect();
    assert_eq!(names, vec!["Iris", "Hugo"]);
    assert!(page.ranking[1].is_current_user);
    assert_eq!(page.ranking[1].rank, 2);
    Ok(())
}

#[tokio::test]
async fn empty_cache_ranking_matches_ledger_order() -> Result<()> {
    let harness = Harness::new()?;
    for (index, xp) in [300_u64, 1_200, 50, 800, 1_200].into_iter().enumerate() {
        harness
            .ledger
            .add_user(Uuid::new_v4(), &format!("colab-{index}"), Role::Colaborador, xp)
            .await;
    }
    let pipeline = harness.start();
    let viewer = Uuid::new_v4();

    let expected: Vec<Uuid> = harness
        .ledger
        .top_colaboradores(1, 3)
        .await?
        .into_iter()
        .map(|profile| profile.user_id)
        .collect();
    let page = pipeline.ranking().global_ranking(1, 3, viewer).await?;
    assert_eq!(page.source, RankingSource::Ledger);
    let served: Vec<Uuid> = page.ranking.iter().map(|row| row.user_id).collect();
    assert_eq!(served, expected);
    let ranks: Vec<u64> = page.ranking.iter().map(|row| row.rank).collect();
    assert_eq!(ranks, vec![2, 3, 4]);

    // the fallback rebuilt the whole board, so page 0 is served from it with global ranks
    let leaders: Vec<Uuid> = harness
        .ledger
        .top_colaboradores(0, 3)
        .await?
        .into_iter()
        .map(|profile| profile.user_id)
        .collect();
    let cached = pipeline.ranking().global_ranking(0, 3, viewer).await?;
    assert_eq!(cached.source, RankingSource::Cache);
    let served: Vec<(Uuid, u64)> = cached
        .ranking
        .iter()
        .map(|row| (row.user_id, row.rank))
        .collect();
    assert_eq!(served, leaders.into_iter().zip(1_u64..).collect::<Vec<_>>());
    assert_eq!(cached.current_user_rank, None);
    pipeline.shutdown().await;
    Ok(())
}
