//! Traits implemented by storage and cache adapters.

use async_trait::async_trait;
use pulse_events::{GamificationEvent, NotificationEvent, UserId};
use uuid::Uuid;

use crate::error::LeaderboardResult;
use crate::model::{AwardOutcome, LeaderboardEntry, LedgerEntry, UserProfile};

/// Authoritative per-user XP, star and level store.
#[async_trait]
pub trait UserLedger: Send + Sync {
    /// Apply an award atomically: lock the entry, re-check eligibility on the
    /// stored role, write the plan from [`plan_award`](crate::plan_award) and
    /// append exactly one audit record. Skipped awards write nothing.
    async fn apply_award(&self, event: &GamificationEvent) -> anyhow::Result<AwardOutcome>;

    /// Point lookup.
    async fn entry(&self, user_id: UserId) -> anyhow::Result<Option<LedgerEntry>>;

    /// Active colaboradores ordered by XP descending.
    async fn top_colaboradores(&self, offset: u64, limit: u64)
    -> anyhow::Result<Vec<UserProfile>>;

    /// `(user_id, xp)` for every active colaborador, the full leaderboard
    /// membership.
    async fn colaborador_scores(&self) -> anyhow::Result<Vec<(UserId, u64)>>;

    /// Profiles of the given ids that belong on the leaderboard. Unknown,
    /// inactive and non-colaborador ids are omitted.
    async fn ranked_profiles(&self, ids: &[UserId]) -> anyhow::Result<Vec<UserProfile>>;
}

/// Sorted-set projection of colaborador XP.
#[async_trait]
pub trait Leaderboard: Send + Sync {
    /// Set the user's score.
    async fn update_score(&self, user_id: UserId, xp: u64) -> LeaderboardResult<()>;

    /// Replace the whole board with `scores`. An empty slice clears it.
    async fn replace_scores(&self, scores: &[(UserId, u64)]) -> LeaderboardResult<()>;

    /// Drop the user from the board. Removing an absent user is not an error.
    async fn remove(&self, user_id: UserId) -> LeaderboardResult<()>;

    /// Entries ranked `offset + 1 ..= offset + limit`, highest score first.
    async fn top_n(&self, offset: u64, limit: u64) -> LeaderboardResult<Vec<LeaderboardEntry>>;

    /// One-based rank, or `None` when the user is not on the board.
    async fn rank(&self, user_id: UserId) -> LeaderboardResult<Option<u64>>;
}

/// Sink for user-visible notifications.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist an unread notification and return its identifier.
    async fn insert(&self, event: &NotificationEvent) -> anyhow::Result<Uuid>;
}
