use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use pulse_core::{
    AwardOutcome, NotificationStatus, NotificationStore, UserLedger, level_of, threshold_for,
};
use pulse_data::{LedgerStore, NotificationRepository, PgJobQueue, QueueCounts, run_migrations};
use pulse_events::{
    Action, AwardContext, GamificationEvent, Job, JobDisposition, JobQueue, NotificationEvent,
    NotificationKind, QueueName, Reward, RetryPolicy, Role, UserId,
};
use pulse_test_support::containers::start_postgres;
use pulse_test_support::fixtures::docker_available;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

async fn with_database<F, Fut>(test: F) -> Result<()>
where
    F: FnOnce(PgPool) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    if !docker_available() {
        eprintln!("skipping postgres tests: docker socket missing");
        return Ok(());
    }
    let fixture = start_postgres().await?;
    run_migrations(fixture.pool())
        .await
        .context("failed to apply migrations")?;
    let result = test(fixture.pool().clone()).await;
    fixture.close().await;
    result
}

async fn provision(pool: &PgPool, name: &str, role: Role, xp: i64) -> Result<UserId> {
    let id = Uuid::new_v4();
    let level = level_of(u64::try_from(xp)?);
    let threshold = i64::try_from(threshold_for(level))?;
    sqlx::query(
        "INSERT INTO pulse.users (id, name, role, xp, level, xp_next_threshold) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(id)
    .bind(name)
    .bind(role.as_str())
    .bind(xp)
    .bind(i32::try_from(level)?)
    .bind(threshold)
    .execute(pool)
    .await
    .context("failed to provision user")?;
    Ok(id)
}

fn award(user_id: UserId, xp: u32) -> GamificationEvent {
    GamificationEvent::new(
        user_id,
        Role::Colaborador,
        Action::CompleteTraining,
        Reward { xp, stars: 2 },
        AwardContext::new().with("course_id", "c-42"),
    )
}

#[tokio::test]
async fn award_updates_ledger_and_writes_one_audit_row() -> Result<()> {
    with_database(|pool| async move {
        let ledger = LedgerStore::new(pool.clone());
        let user = provision(&pool, "Ana", Role::Colaborador, 0).await?;

        let outcome = ledger.apply_award(&award(user, 600)).await?;
        let AwardOutcome::Applied(applied) = outcome else {
            anyhow::bail!("expected applied award, got {outcome:?}");
        };
        assert_eq!(applied.level, 3);
        assert!(applied.level_change.leveled_up);

        let entry = ledger.entry(user).await?.context("entry missing")?;
        assert_eq!(entry.xp, 600);
        assert_eq!(entry.stars, 2);
        assert_eq!(entry.level, 3);
        assert_eq!(entry.xp_next_threshold, 1_500);

        let history = ledger.xp_history(user, 10).await?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, Action::CompleteTraining);
        assert_eq!(history[0].context["course_id"], json!("c-42"));
        assert!(history[0].leveled_up);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn skipped_awards_write_nothing() -> Result<()> {
    with_database(|pool| async move {
        let ledger = LedgerStore::new(pool.clone());
        let manager = provision(&pool, "Bruno", Role::Gestor, 40).await?;
        let ghost = Uuid::new_v4();

        assert_eq!(
            ledger.apply_award(&award(manager, 50)).await?,
            AwardOutcome::Ineligible { role: Role::Gestor }
        );
        assert_eq!(
            ledger.apply_award(&award(ghost, 50)).await?,
            AwardOutcome::MissingUser
        );

        let entry = ledger.entry(manager).await?.context("entry missing")?;
        assert_eq!(entry.xp, 40);
        let audit_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pulse.xp_audit")
            .fetch_one(&pool)
            .await?;
        assert_eq!(audit_rows, 0);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn concurrent_awards_for_one_user_do_not_lose_updates() -> Result<()> {
    with_database(|pool| async move {
        let ledger = Arc::new(LedgerStore::new(pool.clone()));
        let user = provision(&pool, "Carla", Role::Colaborador, 50).await?;

        let mut tasks = Vec::new();
        for xp in 1..=20_u32 {
            let ledger = Arc::clone(&ledger);
            tasks.push(tokio::spawn(
                async move { ledger.apply_award(&award(user, xp)).await },
            ));
        }
        for task in tasks {
            task.await??;
        }

        let entry = ledger.entry(user).await?.context("entry missing")?;
        let expected: u64 = 50 + (1..=20).sum::<u64>();
        assert_eq!(entry.xp, expected);
        assert_eq!(entry.stars, 40);
        assert_eq!(entry.level, level_of(expected));
        assert_eq!(ledger.xp_history(user, 100).await?.len(), 20);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn ranking_query_orders_active_colaboradores_by_xp() -> Result<()> {
    with_database(|pool| async move {
        let ledger = LedgerStore::new(pool.clone());
        let low = provision(&pool, "Davi", Role::Colaborador, 10).await?;
        let high = provision(&pool, "Eva", Role::Colaborador, 900).await?;
        let mid = provision(&pool, "Fábio", Role::Colaborador, 300).await?;
        let admin = provision(&pool, "Gabi", Role::SuperAdmin, 5_000).await?;
        let inactive = provision(&pool, "Hugo", Role::Colaborador, 10_000).await?;
        sqlx::query("UPDATE pulse.users SET active = FALSE WHERE id = $1")
            .bind(inactive)
            .execute(&pool)
            .await?;

        let page: Vec<UserId> = ledger
            .top_colaboradores(0, 10)
            .await?
            .into_iter()
            .map(|profile| profile.user_id)
            .collect();
        assert_eq!(page, vec![high, mid, low]);

        let second = ledger.top_colaboradores(1, 1).await?;
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].user_id, mid);

        let profiles = ledger
            .ranked_profiles(&[low, inactive, admin, Uuid::new_v4()])
            .await?;
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].name, "Davi");
        assert!(ledger.ranked_profiles(&[]).await?.is_empty());

        let mut scores = ledger.colaborador_scores().await?;
        scores.sort_by(|left, right| right.1.cmp(&left.1));
        assert_eq!(scores, vec![(high, 900), (mid, 300), (low, 10)]);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn notification_lifecycle() -> Result<()> {
    with_database(|pool| async move {
        let repo = NotificationRepository::new(pool.clone());
        let owner = Uuid::new_v4();
        let event = NotificationEvent {
            user_id: owner,
            kind: NotificationKind::XpGained,
            title: "XP ganho!".into(),
            message: "Você ganhou 30 XP por dar feedback".into(),
            data: json!({ "xp": 30 }),
        };
        let first = repo.insert(&event).await?;
        repo.insert(&event).await?;
        assert_eq!(repo.unread_count(owner).await?, 2);

        assert!(!repo.mark_read(Uuid::new_v4(), first).await?);
        assert!(repo.mark_read(owner, first).await?);
        assert!(repo.mark_read(owner, first).await?);
        assert_eq!(repo.unread_count(owner).await?, 1);

        let unread = repo.list(owner, true, 10).await?;
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].status, NotificationStatus::Unread);
        assert_eq!(unread[0].data, json!({ "xp": 30 }));

        assert_eq!(repo.mark_all_read(owner).await?, 1);
        let all = repo.list(owner, false, 10).await?;
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|note| note.read_at.is_some()));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn job_queue_claims_retries_and_parks() -> Result<()> {
    with_database(|pool| async move {
        let queue = PgJobQueue::new(pool.clone());
        let id = queue
            .enqueue(Job::Gamification(award(Uuid::new_v4(), 10)))
            .await?;
        queue
            .enqueue(Job::Notification(NotificationEvent {
                user_id: Uuid::new_v4(),
                kind: NotificationKind::System,
                title: "Aviso".into(),
                message: "Olá".into(),
                data: json!({}),
            }))
            .await?;

        let claimed = queue.claim(QueueName::Gamification, 10).await?;
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, id);
        assert_eq!(claimed[0].attempt, 1);
        assert!(queue.claim(QueueName::Gamification, 10).await?.is_empty());

        let policy = RetryPolicy {
            max_attempts: 2,
            backoff: pulse_events::Backoff::Fixed {
                delay: Duration::ZERO,
            },
        };
        let first = queue.fail(id, "ledger timeout", &policy).await?;
        assert!(matches!(first, JobDisposition::Retrying { attempt: 1, .. }));

        let again = queue.claim(QueueName::Gamification, 10).await?;
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].attempt, 2);
        let last = queue.fail(id, "ledger timeout", &policy).await?;
        assert_eq!(last, JobDisposition::Failed { attempts: 2 });
        assert!(queue.fail(id, "again", &policy).await.is_err());

        assert_eq!(
            queue.counts(QueueName::Gamification).await?,
            QueueCounts {
                failed: 1,
                ..QueueCounts::default()
            }
        );

        let notes = queue.claim(QueueName::Notifications, 10).await?;
        queue.complete(notes[0].id).await?;
        assert!(queue.complete(notes[0].id).await.is_err());
        assert_eq!(queue.counts(QueueName::Notifications).await?.completed, 1);
        assert_eq!(queue.purge_completed(Duration::ZERO).await?, 1);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn expired_lease_makes_job_claimable_again() -> Result<()> {
    with_database(|pool| async move {
        let queue = PgJobQueue::new(pool.clone()).with_lease(Duration::from_millis(50));
        let id = queue
            .enqueue(Job::Gamification(award(Uuid::new_v4(), 5)))
            .await?;
        assert_eq!(queue.claim(QueueName::Gamification, 1).await?.len(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let redelivered = queue.claim(QueueName::Gamification, 1).await?;
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].id, id);
        assert_eq!(redelivered[0].attempt, 2);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn undecodable_payload_is_parked_without_blocking_the_batch() -> Result<()> {
    with_database(|pool| async move {
        let queue = PgJobQueue::new(pool.clone());
        let bad_id: i64 = sqlx::query_scalar(
            "INSERT INTO pulse_queue.jobs (queue, payload) VALUES ('gamification', $1) RETURNING id",
        )
        .bind(json!({ "kind": "gamification", "payload": { "bogus": true } }))
        .fetch_one(&pool)
        .await?;
        let good_id = queue
            .enqueue(Job::Gamification(award(Uuid::new_v4(), 15)))
            .await?;

        let claimed = queue.claim(QueueName::Gamification, 5).await?;
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, good_id);

        let counts = queue.counts(QueueName::Gamification).await?;
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.active, 1);
        let last_error: Option<String> =
            sqlx::query_scalar("SELECT last_error FROM pulse_queue.jobs WHERE id = $1")
                .bind(bad_id)
                .fetch_one(&pool)
                .await?;
        assert!(last_error.is_some_and(|reason| reason.starts_with("undecodable payload")));

        assert!(queue.claim(QueueName::Gamification, 5).await?.is_empty());
        Ok(())
    })
    .await
}
