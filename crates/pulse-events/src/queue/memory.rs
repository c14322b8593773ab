use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{
    ClaimedJob, Job, JobDisposition, JobId, JobQueue, QueueName, RetryDecision, RetryPolicy,
};
use crate::error::{QueueError, QueueResult};

/// In-process queue used by single-node deployments and tests.
///
/// Jobs are delivered in enqueue order. Claimed jobs stay leased until the
/// worker completes or fails them; there is no lease expiry because a crashed
/// worker takes the whole queue down with it.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<MemoryState>,
    gamification_ready: Notify,
    notifications_ready: Notify,
}

#[derive(Default)]
struct MemoryState {
    next_id: JobId,
    entries: BTreeMap<JobId, Entry>,
    completed: usize,
}

struct Entry {
    job: Job,
    attempts: u32,
    status: EntryStatus,
}

enum EntryStatus {
    Pending { run_at: Instant },
    Claimed,
    Failed { error: String },
}

impl MemoryQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    const fn notifier(&self, queue: QueueName) -> &Notify {
        match queue {
            QueueName::Gamification => &self.gamification_ready,
            QueueName::Notifications => &self.notifications_ready,
        }
    }

    /// Jobs waiting on `queue`, including those delayed for a retry.
    pub async fn pending(&self, queue: QueueName) -> usize {
        let state = self.state.lock().await;
        state
            .entries
            .values()
            .filter(|entry| entry.job.queue() == queue)
            .filter(|entry| matches!(entry.status, EntryStatus::Pending { .. }))
            .count()
    }

    /// Jobs whose retries are exhausted, with the last recorded error.
    pub async fn failed_jobs(&self) -> Vec<(Job, String)> {
        let state = self.state.lock().await;
        state
            .entries
            .values()
            .filter_map(|entry| match &entry.status {
                EntryStatus::Failed { error } => Some((entry.job.clone(), error.clone())),
                _ => None,
            })
            .collect()
    }

    /// Number of jobs acknowledged as done.
    pub async fn completed_count(&self) -> usize {
        self.state.lock().await.completed
    }
}

const MAX_RETRY_DELAY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

fn wall_clock_after(delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delta| Utc::now().checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: Job) -> QueueResult<JobId> {
        let queue = job.queue();
        let id = {
            let mut state = self.state.lock().await;
            state.next_id += 1;
            let id = state.next_id;
            state.entries.insert(
                id,
                Entry {
                    job,
                    attempts: 0,
                    status: EntryStatus::Pending {
                        run_at: Instant::now(),
                    },
                },
            );
            id
        };
        self.notifier(queue).notify_one();
        Ok(id)
    }

    async fn claim(&self, queue: QueueName, limit: usize) -> QueueResult<Vec<ClaimedJob>> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let mut claimed = Vec::new();
        for (id, entry) in &mut state.entries {
            if claimed.len() >= limit {
                break;
            }
            let ready = matches!(entry.status, EntryStatus::Pending { run_at } if run_at <= now);
            if entry.job.queue() != queue || !ready {
                continue;
            }
            entry.attempts += 1;
            entry.status = EntryStatus::Claimed;
            claimed.push(ClaimedJob {
                id: *id,
                attempt: entry.attempts,
                job: entry.job.clone(),
            });
        }
        Ok(claimed)
    }

    async fn complete(&self, id: JobId) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        let claimed = state
            .entries
            .get(&id)
            .is_some_and(|entry| matches!(entry.status, EntryStatus::Claimed));
        if !claimed {
            return Err(QueueError::UnknownJob { job_id: id });
        }
        state.entries.remove(&id);
        state.completed += 1;
        Ok(())
    }

    async fn fail(
        &self,
        id: JobId,
        error: &str,
        policy: &RetryPolicy,
    ) -> QueueResult<JobDisposition> {
        let mut state = self.state.lock().await;
        let entry = state
            .entries
            .get_mut(&id)
            .filter(|entry| matches!(entry.status, EntryStatus::Claimed))
            .ok_or(QueueError::UnknownJob { job_id: id })?;

        match policy.decide(entry.attempts) {
            RetryDecision::Retry { delay } => {
                entry.status = EntryStatus::Pending {
                    run_at: Instant::now() + delay.min(MAX_RETRY_DELAY),
                };
                Ok(JobDisposition::Retrying {
                    attempt: entry.attempts,
                    run_at: wall_clock_after(delay),
                })
            }
            RetryDecision::Exhausted => {
                entry.status = EntryStatus::Failed {
                    error: error.to_string(),
                };
                Ok(JobDisposition::Failed {
                    attempts: entry.attempts,
                })
            }
        }
    }

    async fn wait_for_work(&self, queue: QueueName, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notifier(queue).notified()).await;
    }
}
