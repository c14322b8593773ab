//! Connection and key settings for the Redis leaderboard.

use std::time::Duration;

/// Sorted-set key used when none is configured.
pub const DEFAULT_LEADERBOARD_KEY: &str = "pulse:leaderboard:xp";

/// Tunables for [`RedisLeaderboard`](crate::RedisLeaderboard).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardSettings {
    /// Sorted-set key holding `user_id -> xp`.
    pub key: String,
    /// Expiry refreshed on every write.
    pub ttl: Duration,
    /// Connection attempts before the client gives up and cools down.
    pub connect_attempts: u32,
    /// Upper bound on a single connection attempt.
    pub connect_timeout: Duration,
    /// Upper bound on one command over an open connection.
    pub command_timeout: Duration,
    /// How long calls fail immediately after connecting gave up.
    pub cooldown: Duration,
}

impl Default for LeaderboardSettings {
    fn default() -> Self {
        Self {
            key: DEFAULT_LEADERBOARD_KEY.to_string(),
            ttl: Duration::from_secs(3_600),
            connect_attempts: 3,
            connect_timeout: Duration::from_millis(500),
            command_timeout: Duration::from_millis(500),
            cooldown: Duration::from_secs(30),
        }
    }
}

impl LeaderboardSettings {
    /// Expiry in whole seconds, never below one.
    #[must_use]
    pub fn ttl_secs(&self) -> i64 {
        i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX).max(1)
    }
}
