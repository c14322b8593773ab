//! Durable job queue on `pulse_queue.jobs`.
//!
//! Claims lease rows with `FOR UPDATE SKIP LOCKED`, so any number of workers
//! can poll the same queue. A worker that dies mid-job leaves an `active` row
//! whose lease eventually lapses, after which the job is claimed again.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulse_events::{
    ClaimedJob, Job, JobDisposition, JobId, JobQueue, QueueError, QueueName, QueueResult,
    RetryDecision, RetryPolicy,
};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::warn;

use crate::widen_u64;

const DEFAULT_LEASE: Duration = Duration::from_secs(300);

const INSERT_JOB: &str = r"
    INSERT INTO pulse_queue.jobs (queue, payload)
    VALUES ($1, $2)
    RETURNING id
";

const CLAIM_JOBS: &str = r"
    WITH ready AS (
        SELECT id
        FROM pulse_queue.jobs
        WHERE queue = $1
          AND (
                (status = 'waiting' AND run_at <= now())
             OR (status = 'active' AND locked_until < now())
          )
        ORDER BY run_at, id
        LIMIT $2
        FOR UPDATE SKIP LOCKED
    )
    UPDATE pulse_queue.jobs AS jobs
    SET status = 'active',
        attempts = jobs.attempts + 1,
        locked_until = now() + make_interval(secs => $3),
        updated_at = now()
    FROM ready
    WHERE jobs.id = ready.id
    RETURNING jobs.id, jobs.attempts, jobs.payload
";

const COMPLETE_JOB: &str = r"
    UPDATE pulse_queue.jobs
    SET status = 'completed',
        locked_until = NULL,
        finished_at = now(),
        updated_at = now()
    WHERE id = $1 AND status = 'active'
";

const LOCK_ACTIVE_JOB: &str = r"
    SELECT attempts
    FROM pulse_queue.jobs
    WHERE id = $1 AND status = 'active'
    FOR UPDATE
";

const RESCHEDULE_JOB: &str = r"
    UPDATE pulse_queue.jobs
    SET status = 'waiting',
        last_error = $2,
        run_at = now() + make_interval(secs => $3),
        locked_until = NULL,
        updated_at = now()
    WHERE id = $1
    RETURNING run_at
";

const PARK_JOB: &str = r"
    UPDATE pulse_queue.jobs
    SET status = 'failed',
        last_error = $2,
        locked_until = NULL,
        finished_at = now(),
        updated_at = now()
    WHERE id = $1
";

const PURGE_COMPLETED: &str = r"
    DELETE FROM pulse_queue.jobs
    WHERE status = 'completed'
      AND finished_at <= now() - make_interval(secs => $1)
";

const COUNT_BY_STATUS: &str = r"
    SELECT status, COUNT(*) AS jobs
    FROM pulse_queue.jobs
    WHERE queue = $1
    GROUP BY status
";

/// Per-status job counts for one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    /// Ready or delayed jobs.
    pub waiting: u64,
    /// Leased jobs.
    pub active: u64,
    /// Acknowledged jobs not yet purged.
    pub completed: u64,
    /// Jobs whose retries are exhausted.
    pub failed: u64,
}

/// Postgres-backed [`JobQueue`].
#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
    lease: Duration,
}

impl PgJobQueue {
    /// Queue with the default five minute lease.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease: DEFAULT_LEASE,
        }
    }

    /// Override how long a claim stays exclusive before the job is redelivered.
    #[must_use]
    pub const fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Delete completed jobs that finished more than `older_than` ago.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Unavailable`] if the delete fails.
    pub async fn purge_completed(&self, older_than: Duration) -> QueueResult<u64> {
        let result = sqlx::query(PURGE_COMPLETED)
            .bind(older_than.as_secs_f64())
            .execute(&self.pool)
            .await
            .map_err(|err| QueueError::unavailable("purge_completed", err))?;
        Ok(result.rows_affected())
    }

    // A payload this build cannot decode will never succeed, so it is failed
    // in place instead of holding up the rest of the claimed batch. A failed
    // park leaves the lease to expire and the row is retried on a later claim.
    async fn park_undecodable(&self, queue: QueueName, id: JobId, err: &serde_json::Error) {
        let reason = format!("undecodable payload: {err}");
        warn!(queue = %queue, job_id = id, error = %err, "parking undecodable job");
        if let Err(park_err) = sqlx::query(PARK_JOB)
            .bind(id)
            .bind(&reason)
            .execute(&self.pool)
            .await
        {
            warn!(job_id = id, error = %park_err, "failed to park undecodable job");
        }
    }

    /// Job counts per status for `queue`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Unavailable`] if the query fails.
    pub async fn counts(&self, queue: QueueName) -> QueueResult<QueueCounts> {
        let rows = sqlx::query(COUNT_BY_STATUS)
            .bind(queue.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|err| QueueError::unavailable("counts", err))?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let status: String = row
                .try_get("status")
                .map_err(|err| QueueError::unavailable("counts", err))?;
            let jobs = widen_u64(
                row.try_get("jobs")
                    .map_err(|err| QueueError::unavailable("counts", err))?,
            );
            match status.as_str() {
                "waiting" => counts.waiting = jobs,
                "active" => counts.active = jobs,
                "completed" => counts.completed = jobs,
                "failed" => counts.failed = jobs,
                other => warn!(status = %other, "unknown job status in queue table"),
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: Job) -> QueueResult<JobId> {
        let queue = job.queue();
        let payload = serde_json::to_value(&job).map_err(|source| QueueError::Serialization {
            operation: "enqueue",
            source,
        })?;
        let row = sqlx::query(INSERT_JOB)
            .bind(queue.as_str())
            .bind(Json(payload))
            .fetch_one(&self.pool)
            .await
            .map_err(|err| QueueError::unavailable("enqueue", err))?;
        row.try_get("id")
            .map_err(|err| QueueError::unavailable("enqueue", err))
    }

    async fn claim(&self, queue: QueueName, limit: usize) -> QueueResult<Vec<ClaimedJob>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(CLAIM_JOBS)
            .bind(queue.as_str())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .bind(self.lease.as_secs_f64())
            .fetch_all(&self.pool)
            .await
            .map_err(|err| QueueError::unavailable("claim", err))?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in rows {
            let id: JobId = row
                .try_get("id")
                .map_err(|err| QueueError::unavailable("claim", err))?;
            let attempts: i32 = row
                .try_get("attempts")
                .map_err(|err| QueueError::unavailable("claim", err))?;
            let Json(payload) = row
                .try_get::<Json<serde_json::Value>, _>("payload")
                .map_err(|err| QueueError::unavailable("claim", err))?;
            match serde_json::from_value(payload) {
                Ok(job) => claimed.push(ClaimedJob {
                    id,
                    attempt: u32::try_from(attempts).unwrap_or(1),
                    job,
                }),
                Err(err) => self.park_undecodable(queue, id, &err).await,
            }
        }
        claimed.sort_by_key(|job| job.id);
        Ok(claimed)
    }

    async fn complete(&self, id: JobId) -> QueueResult<()> {
        let result = sqlx::query(COMPLETE_JOB)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| QueueError::unavailable("complete", err))?;
        if result.rows_affected() == 0 {
            return Err(QueueError::UnknownJob { job_id: id });
        }
        Ok(())
    }

    async fn fail(
        &self,
        id: JobId,
        error: &str,
        policy: &RetryPolicy,
    ) -> QueueResult<JobDisposition> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| QueueError::unavailable("fail", err))?;
        let row = sqlx::query(LOCK_ACTIVE_JOB)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|err| QueueError::unavailable("fail", err))?
            .ok_or(QueueError::UnknownJob { job_id: id })?;
        let attempts: i32 = row
            .try_get("attempts")
            .map_err(|err| QueueError::unavailable("fail", err))?;
        let attempts = u32::try_from(attempts).unwrap_or(1);

        let disposition = match policy.decide(attempts) {
            RetryDecision::Retry { delay } => {
                let row = sqlx::query(RESCHEDULE_JOB)
                    .bind(id)
                    .bind(error)
                    .bind(delay.as_secs_f64())
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|err| QueueError::unavailable("fail", err))?;
                let run_at: DateTime<Utc> = row
                    .try_get("run_at")
                    .map_err(|err| QueueError::unavailable("fail", err))?;
                JobDisposition::Retrying {
                    attempt: attempts,
                    run_at,
                }
            }
            RetryDecision::Exhausted => {
                sqlx::query(PARK_JOB)
                    .bind(id)
                    .bind(error)
                    .execute(&mut *tx)
                    .await
                    .map_err(|err| QueueError::unavailable("fail", err))?;
                JobDisposition::Failed { attempts }
            }
        };

        tx.commit()
            .await
            .map_err(|err| QueueError::unavailable("fail", err))?;
        Ok(disposition)
    }
}
