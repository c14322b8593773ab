//! Leaderboard used when no cache is configured.

use async_trait::async_trait;
use pulse_core::{Leaderboard, LeaderboardEntry, LeaderboardError, LeaderboardResult};
use pulse_events::UserId;

/// Reports every call as unavailable so readers always take the ledger path.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledLeaderboard;

fn disabled(operation: &'static str) -> LeaderboardError {
    LeaderboardError::Unavailable {
        operation,
        detail: "leaderboard cache disabled".to_string(),
    }
}

#[async_trait]
impl Leaderboard for DisabledLeaderboard {
    async fn update_score(&self, _user_id: UserId, _xp: u64) -> LeaderboardResult<()> {
        Err(disabled("update_score"))
    }

    async fn replace_scores(&self, _scores: &[(UserId, u64)]) -> LeaderboardResult<()> {
        Err(disabled("replace_scores"))
    }

    async fn remove(&self, _user_id: UserId) -> LeaderboardResult<()> {
        Err(disabled("remove"))
    }

    async fn top_n(&self, _offset: u64, _limit: u64) -> LeaderboardResult<Vec<LeaderboardEntry>> {
        Err(disabled("top_n"))
    }

    async fn rank(&self, _user_id: UserId) -> LeaderboardResult<Option<u64>> {
        Err(disabled("rank"))
    }
}
