//! Typed configuration consumed by the worker bootstrap.

use std::time::Duration;

/// Where jobs are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueBackend {
    /// Durable `pulse_queue.jobs` table shared by every worker process.
    #[default]
    Postgres,
    /// In-process queue; jobs do not survive a restart.
    Memory,
}

impl QueueBackend {
    /// Configuration label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Memory => "memory",
        }
    }
}

/// Concurrency and retry budget for one queue's consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerSettings {
    /// Jobs processed in parallel.
    pub concurrency: usize,
    /// Delivery attempts before the job is parked as failed.
    pub max_attempts: u32,
    /// Retry delay: the exponential base for gamification, fixed for notifications.
    pub backoff: Duration,
}

/// Leaderboard cache connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Redis endpoint; `None` disables the cache.
    pub redis_url: Option<String>,
    /// Sorted-set key.
    pub key: String,
    /// Expiry refreshed on write.
    pub ttl: Duration,
    /// Connection attempts before cooling down.
    pub connect_attempts: u32,
    /// Bound on each connection attempt.
    pub connect_timeout: Duration,
    /// Bound on each command sent over an open connection.
    pub command_timeout: Duration,
    /// Fail-fast window after attempts are exhausted.
    pub cooldown: Duration,
}

/// Logging preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// `json` or `pretty`; `None` picks a format for the build profile.
    pub format: Option<String>,
}

/// Complete worker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Postgres connection string.
    pub database_url: String,
    /// Postgres pool size.
    pub database_max_connections: u32,
    /// Job storage.
    pub queue_backend: QueueBackend,
    /// Gamification consumer.
    pub gamification: ConsumerSettings,
    /// Notification consumer.
    pub notifications: ConsumerSettings,
    /// Idle poll interval for both consumers.
    pub poll_interval: Duration,
    /// Bound on a single dispatcher enqueue.
    pub dispatch_timeout: Duration,
    /// Leaderboard cache.
    pub cache: CacheSettings,
    /// Logging.
    pub log: LogSettings,
}
