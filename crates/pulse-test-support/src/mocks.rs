//! In-memory adapters for the ledger, leaderboard, notification and queue seams.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use anyhow::bail;
use async_trait::async_trait;
use pulse_core::{
    AuditRecord, AwardOutcome, Leaderboard, LeaderboardEntry, LeaderboardError, LeaderboardResult,
    LedgerEntry, NotificationStore, UserLedger, UserProfile, eligibility, level_of, plan_award,
    threshold_for,
};
use pulse_events::{
    ClaimedJob, GamificationEvent, Job, JobDisposition, JobId, JobQueue, NotificationEvent,
    QueueError, QueueName, QueueResult, RetryPolicy, Role, UserId,
};
use tokio::sync::Mutex;
use uuid::Uuid;

struct StoredUser {
    entry: LedgerEntry,
    name: String,
    department: Option<String>,
}

impl StoredUser {
    fn is_ranked(&self) -> bool {
        self.entry.active && self.entry.role == Role::Colaborador
    }

    fn profile(&self) -> UserProfile {
        UserProfile {
            user_id: self.entry.user_id,
            name: self.name.clone(),
            avatar_url: None,
            department: self.department.clone(),
            level: self.entry.level,
            xp: self.entry.xp,
        }
    }
}

#[derive(Default)]
struct LedgerState {
    users: BTreeMap<UserId, StoredUser>,
    audit: Vec<AuditRecord>,
}

/// Ledger kept in a single mutex, so awards are serialised like row locks.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    failures_left: AtomicU32,
}

impl MemoryLedger {
    /// Empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision an active user with `xp` already earned.
    pub async fn add_user(&self, user_id: UserId, name: &str, role: Role, xp: u64) {
        let level = level_of(xp);
        let user = StoredUser {
            entry: LedgerEntry {
                user_id,
                role,
                active: true,
                xp,
                stars: 0,
                level,
                xp_next_threshold: threshold_for(level),
            },
            name: name.to_string(),
            department: Some("Operações".to_string()),
        };
        self.state.lock().await.users.insert(user_id, user);
    }

    /// Delete a user.
    pub async fn remove_user(&self, user_id: UserId) {
        self.state.lock().await.users.remove(&user_id);
    }

    /// Change a stored role.
    pub async fn set_role(&self, user_id: UserId, role: Role) {
        if let Some(user) = self.state.lock().await.users.get_mut(&user_id) {
            user.entry.role = role;
        }
    }

    /// Mark a user inactive without deleting it.
    pub async fn deactivate(&self, user_id: UserId) {
        if let Some(user) = self.state.lock().await.users.get_mut(&user_id) {
            user.entry.active = false;
        }
    }

    /// Make the next `count` awards fail as if the store were unreachable.
    pub fn fail_next(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Audit trail in insertion order.
    pub async fn audit_records(&self) -> Vec<AuditRecord> {
        self.state.lock().await.audit.clone()
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl UserLedger for MemoryLedger {
    async fn apply_award(&self, event: &GamificationEvent) -> anyhow::Result<AwardOutcome> {
        if self.take_failure() {
            bail!("simulated ledger outage");
        }
        let mut state = self.state.lock().await;
        let entry = state.users.get(&event.user_id).map(|user| &user.entry);
        if let Some(skipped) = eligibility(entry).skip_outcome() {
            return Ok(skipped);
        }
        let Some(user) = state.users.get_mut(&event.user_id) else {
            return Ok(AwardOutcome::MissingUser);
        };
        let plan = plan_award(&user.entry, event.xp, event.stars);
        plan.apply_to(&mut user.entry);

        let id = i64::try_from(state.audit.len()).unwrap_or(i64::MAX) + 1;
        state.audit.push(AuditRecord {
            id,
            user_id: event.user_id,
            action: event.action,
            xp_delta: event.xp,
            stars_delta: event.stars,
            xp_total: plan.xp,
            stars_total: plan.stars,
            leveled_up: plan.level_change.leveled_up,
            old_level: plan.level_change.old_level,
            new_level: plan.level_change.new_level,
            context: event.context.clone().into_value(),
            created_at: event.emitted_at,
        });
        Ok(AwardOutcome::Applied(plan.into_applied(event)))
    }

    async fn entry(&self, user_id: UserId) -> anyhow::Result<Option<LedgerEntry>> {
        Ok(self
            .state
            .lock()
            .await
            .users
            .get(&user_id)
            .map(|user| user.entry.clone()))
    }

    async fn top_colaboradores(
        &self,
        offset: u64,
        limit: u64,
    ) -> anyhow::Result<Vec<UserProfile>> {
        let state = self.state.lock().await;
        let mut ranked: Vec<&StoredUser> = state
            .users
            .values()
            .filter(|user| user.is_ranked())
            .collect();
        ranked.sort_by(|left, right| {
            right
                .entry
                .xp
                .cmp(&left.entry.xp)
                .then(right.entry.user_id.cmp(&left.entry.user_id))
        });
        Ok(ranked
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .map(StoredUser::profile)
            .collect())
    }

    async fn colaborador_scores(&self) -> anyhow::Result<Vec<(UserId, u64)>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .filter(|user| user.is_ranked())
            .map(|user| (user.entry.user_id, user.entry.xp))
            .collect())
    }

    async fn ranked_profiles(&self, ids: &[UserId]) -> anyhow::Result<Vec<UserProfile>> {
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.users.get(id))
            .filter(|user| user.is_ranked())
            .map(StoredUser::profile)
            .collect())
    }
}

/// Sorted-set stand-in with a switchable outage.
pub struct MemoryLeaderboard {
    scores: Mutex<HashMap<UserId, u64>>,
    available: AtomicBool,
}

impl Default for MemoryLeaderboard {
    fn default() -> Self {
        Self {
            scores: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl MemoryLeaderboard {
    /// Empty, reachable board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the cache going down or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Current score for a user, ignoring availability.
    pub async fn score(&self, user_id: UserId) -> Option<u64> {
        self.scores.lock().await.get(&user_id).copied()
    }

    /// Number of members, ignoring availability.
    pub async fn len(&self) -> usize {
        self.scores.lock().await.len()
    }

    /// Whether the board has no members.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check(&self, operation: &'static str) -> LeaderboardResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LeaderboardError::Unavailable {
                operation,
                detail: "simulated outage".to_string(),
            })
        }
    }

    async fn ordered(&self) -> Vec<(UserId, u64)> {
        let mut members: Vec<(UserId, u64)> = self
            .scores
            .lock()
            .await
            .iter()
            .map(|(user_id, xp)| (*user_id, *xp))
            .collect();
        members.sort_by(|left, right| right.1.cmp(&left.1).then(right.0.cmp(&left.0)));
        members
    }
}

#[async_trait]
impl Leaderboard for MemoryLeaderboard {
    async fn update_score(&self, user_id: UserId, xp: u64) -> LeaderboardResult<()> {
        self.check("update_score")?;
        self.scores.lock().await.insert(user_id, xp);
        Ok(())
    }

    async fn replace_scores(&self, scores: &[(UserId, u64)]) -> LeaderboardResult<()> {
        self.check("replace_scores")?;
        *self.scores.lock().await = scores.iter().copied().collect();
        Ok(())
    }

    async fn remove(&self, user_id: UserId) -> LeaderboardResult<()> {
        self.check("remove")?;
        self.scores.lock().await.remove(&user_id);
        Ok(())
    }

    async fn top_n(&self, offset: u64, limit: u64) -> LeaderboardResult<Vec<LeaderboardEntry>> {
        self.check("top_n")?;
        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        let take = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(self
            .ordered()
            .await
            .into_iter()
            .zip(1_u64..)
            .skip(skip)
            .take(take)
            .map(|((user_id, xp), rank)| LeaderboardEntry { user_id, xp, rank })
            .collect())
    }

    async fn rank(&self, user_id: UserId) -> LeaderboardResult<Option<u64>> {
        self.check("rank")?;
        Ok(self
            .ordered()
            .await
            .into_iter()
            .zip(1_u64..)
            .find(|((member, _), _)| *member == user_id)
            .map(|(_, rank)| rank))
    }
}

/// Notification sink that records every insert.
#[derive(Default)]
pub struct MemoryNotifications {
    stored: Mutex<Vec<(Uuid, NotificationEvent)>>,
    failures_left: AtomicU32,
}

impl MemoryNotifications {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` inserts fail.
    pub fn fail_next(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Stored notifications in insertion order.
    pub async fn stored(&self) -> Vec<NotificationEvent> {
        self.stored
            .lock()
            .await
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotifications {
    async fn insert(&self, event: &NotificationEvent) -> anyhow::Result<Uuid> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
        {
            bail!("simulated notification store outage");
        }
        let id = Uuid::new_v4();
        self.stored.lock().await.push((id, event.clone()));
        Ok(id)
    }
}

/// Queue whose every call fails as if the broker were down.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnreachableQueue;

fn refused(operation: &'static str) -> QueueError {
    QueueError::unavailable(
        operation,
        io::Error::new(io::ErrorKind::ConnectionRefused, "queue unreachable"),
    )
}

#[async_trait]
impl JobQueue for UnreachableQueue {
    async fn enqueue(&self, _job: Job) -> QueueResult<JobId> {
        Err(refused("enqueue"))
    }

    async fn claim(&self, _queue: QueueName, _limit: usize) -> QueueResult<Vec<ClaimedJob>> {
        Err(refused("claim"))
    }

    async fn complete(&self, _id: JobId) -> QueueResult<()> {
        Err(refused("complete"))
    }

    async fn fail(
        &self,
        _id: JobId,
        _error: &str,
        _policy: &RetryPolicy,
    ) -> QueueResult<JobDisposition> {
        Err(refused("fail"))
    }
}

/// Queue whose enqueue never returns, for exercising caller timeouts.
#[derive(Debug, Default, Clone, Copy)]
pub struct StalledQueue;

#[async_trait]
impl JobQueue for StalledQueue {
    async fn enqueue(&self, _job: Job) -> QueueResult<JobId> {
        std::future::pending().await
    }

    async fn claim(&self, _queue: QueueName, _limit: usize) -> QueueResult<Vec<ClaimedJob>> {
        Ok(Vec::new())
    }

    async fn complete(&self, id: JobId) -> QueueResult<()> {
        Err(QueueError::UnknownJob { job_id: id })
    }

    async fn fail(
        &self,
        id: JobId,
        _error: &str,
        _policy: &RetryPolicy,
    ) -> QueueResult<JobDisposition> {
        Err(QueueError::UnknownJob { job_id: id })
    }
}
