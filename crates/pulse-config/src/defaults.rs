//! Fallback values applied when a variable is unset.

/// Parallel gamification jobs per worker.
pub const GAMIFICATION_CONCURRENCY: usize = 5;
/// Parallel notification jobs per worker.
pub const NOTIFICATION_CONCURRENCY: usize = 10;
/// Delivery attempts for a gamification job.
pub const GAMIFICATION_ATTEMPTS: u32 = 3;
/// First retry delay for gamification jobs; doubles per attempt.
pub const GAMIFICATION_BACKOFF_MS: u64 = 1_000;
/// Delivery attempts for a notification job.
pub const NOTIFICATION_ATTEMPTS: u32 = 2;
/// Fixed retry delay for notification jobs.
pub const NOTIFICATION_BACKOFF_MS: u64 = 2_000;
/// Idle poll interval for queue consumers.
pub const POLL_INTERVAL_MS: u64 = 500;
/// Upper bound on a single dispatcher enqueue.
pub const DISPATCH_TIMEOUT_MS: u64 = 2_000;
/// Postgres pool size.
pub const DB_MAX_CONNECTIONS: u32 = 10;
/// Sorted-set key for the leaderboard.
pub const LEADERBOARD_KEY: &str = "pulse:leaderboard:xp";
/// Leaderboard expiry, refreshed on each write.
pub const LEADERBOARD_TTL_SECS: u64 = 3_600;
/// Cache connection attempts before cooling down.
pub const CACHE_CONNECT_ATTEMPTS: u32 = 3;
/// Upper bound on one cache connection attempt.
pub const CACHE_CONNECT_TIMEOUT_MS: u64 = 500;
/// Upper bound on one cache command on an open connection.
pub const CACHE_COMMAND_TIMEOUT_MS: u64 = 500;
/// Fail-fast window after cache connection attempts are exhausted.
pub const CACHE_COOLDOWN_MS: u64 = 30_000;
/// Log filter used when `PULSE_LOG_LEVEL` is unset.
pub const LOG_LEVEL: &str = "info";
