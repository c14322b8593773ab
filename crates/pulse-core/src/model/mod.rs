//! Domain records shared by the ledger, cache and ranking layers.

use chrono::{DateTime, Utc};
use pulse_events::{Action, NotificationKind, Role, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::levels::LevelChange;

/// Authoritative gamification state for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// User identifier.
    pub user_id: UserId,
    /// Stored role; the authority for reward eligibility.
    pub role: Role,
    /// Deactivated users are treated as missing.
    pub active: bool,
    /// Cumulative XP.
    pub xp: u64,
    /// Redeemable stars.
    pub stars: u64,
    /// Always `level_of(xp)`.
    pub level: u32,
    /// Always `threshold_for(level)`.
    pub xp_next_threshold: u64,
}

/// Result of a committed award.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedAward {
    /// Credited user.
    pub user_id: UserId,
    /// Triggering action.
    pub action: Action,
    /// XP added.
    pub xp_delta: u32,
    /// Stars added.
    pub stars_delta: u32,
    /// XP total after the award.
    pub xp: u64,
    /// Star total after the award.
    pub stars: u64,
    /// Level after the award.
    pub level: u32,
    /// XP needed for the next level.
    pub xp_next_threshold: u64,
    /// Level comparison before/after.
    pub level_change: LevelChange,
}

/// What the ledger did with a gamification event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwardOutcome {
    /// User does not exist (or was deactivated); nothing was written.
    MissingUser,
    /// Stored role does not earn rewards; nothing was written.
    Ineligible {
        /// Role found on the ledger entry.
        role: Role,
    },
    /// Ledger and audit trail were updated.
    Applied(AppliedAward),
}

/// Position of a user in the cached leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// User identifier.
    pub user_id: UserId,
    /// Score held by the cache.
    pub xp: u64,
    /// One-based rank.
    pub rank: u64,
}

/// Public profile fields used to enrich rankings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User identifier.
    pub user_id: UserId,
    /// Display name.
    pub name: String,
    /// Avatar location, if any.
    pub avatar_url: Option<String>,
    /// Department, if any.
    pub department: Option<String>,
    /// Current level.
    pub level: u32,
    /// Current XP on the ledger.
    pub xp: u64,
}

/// Row returned by the ranking read path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingRow {
    /// One-based rank.
    pub rank: u64,
    /// User identifier.
    pub user_id: UserId,
    /// Display name.
    pub name: String,
    /// Avatar location, if any.
    pub avatar_url: Option<String>,
    /// Department, if any.
    pub department: Option<String>,
    /// Current level.
    pub level: u32,
    /// XP used for ordering.
    pub xp: u64,
    /// Whether this row belongs to the requesting user.
    pub is_current_user: bool,
}

/// Where a ranking page was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingSource {
    /// Leaderboard cache.
    Cache,
    /// Direct ledger query.
    Ledger,
}

/// One page of the global ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingPage {
    /// Ordered rows.
    pub ranking: Vec<RankingRow>,
    /// Requesting user's cached rank; `None` when unknown or the cache is down.
    pub current_user_rank: Option<u64>,
    /// Source of `ranking`.
    pub source: RankingSource,
}

/// Append-only record of an applied award.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Row identifier.
    pub id: i64,
    /// Credited user.
    pub user_id: UserId,
    /// Triggering action.
    pub action: Action,
    /// XP added.
    pub xp_delta: u32,
    /// Stars added.
    pub stars_delta: u32,
    /// XP total after the award.
    pub xp_total: u64,
    /// Star total after the award.
    pub stars_total: u64,
    /// Whether the award crossed a level threshold.
    pub leveled_up: bool,
    /// Level before the award.
    pub old_level: u32,
    /// Level after the award.
    pub new_level: u32,
    /// Producer-supplied context.
    pub context: Value,
    /// Commit time.
    pub created_at: DateTime<Utc>,
}

/// Notification lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Not yet seen.
    Unread,
    /// Acknowledged by the user.
    Read,
}

impl NotificationStatus {
    /// Storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unread => "unread",
            Self::Read => "read",
        }
    }
}

/// Persisted user-visible notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Notification identifier.
    pub id: Uuid,
    /// Recipient.
    pub user_id: UserId,
    /// Category.
    pub kind: NotificationKind,
    /// Short title.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Opaque client data.
    pub data: Value,
    /// Lifecycle state.
    pub status: NotificationStatus,
    /// Insert time.
    pub created_at: DateTime<Utc>,
    /// When the user read it.
    pub read_at: Option<DateTime<Utc>>,
}
