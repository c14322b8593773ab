//! Environment parsing.
//!
//! Empty or whitespace-only variables count as unset. Every value is
//! validated up front so a misconfigured worker refuses to start instead of
//! failing on its first job.

use std::time::Duration;

use tracing::debug;

use crate::defaults;
use crate::error::{ConfigError, ConfigResult};
use crate::model::{CacheSettings, ConsumerSettings, LogSettings, PipelineConfig, QueueBackend};

const DATABASE_URL: &str = "DATABASE_URL";
const DB_MAX_CONNECTIONS: &str = "PULSE_DB_MAX_CONNECTIONS";
const REDIS_URL: &str = "REDIS_URL";
const QUEUE_BACKEND: &str = "PULSE_QUEUE_BACKEND";
const GAMIFICATION_CONCURRENCY: &str = "PULSE_GAMIFICATION_CONCURRENCY";
const NOTIFICATION_CONCURRENCY: &str = "PULSE_NOTIFICATION_CONCURRENCY";
const GAMIFICATION_ATTEMPTS: &str = "PULSE_GAMIFICATION_ATTEMPTS";
const GAMIFICATION_BACKOFF_MS: &str = "PULSE_GAMIFICATION_BACKOFF_MS";
const NOTIFICATION_ATTEMPTS: &str = "PULSE_NOTIFICATION_ATTEMPTS";
const NOTIFICATION_BACKOFF_MS: &str = "PULSE_NOTIFICATION_BACKOFF_MS";
const POLL_INTERVAL_MS: &str = "PULSE_POLL_INTERVAL_MS";
const DISPATCH_TIMEOUT_MS: &str = "PULSE_DISPATCH_TIMEOUT_MS";
const LEADERBOARD_KEY: &str = "PULSE_LEADERBOARD_KEY";
const LEADERBOARD_TTL_SECS: &str = "PULSE_LEADERBOARD_TTL_SECS";
const CACHE_CONNECT_ATTEMPTS: &str = "PULSE_CACHE_CONNECT_ATTEMPTS";
const CACHE_CONNECT_TIMEOUT_MS: &str = "PULSE_CACHE_CONNECT_TIMEOUT_MS";
const CACHE_COMMAND_TIMEOUT_MS: &str = "PULSE_CACHE_COMMAND_TIMEOUT_MS";
const CACHE_COOLDOWN_MS: &str = "PULSE_CACHE_COOLDOWN_MS";
const LOG_LEVEL: &str = "PULSE_LOG_LEVEL";
const LOG_FORMAT: &str = "PULSE_LOG_FORMAT";

impl PipelineConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or any
    /// variable fails validation.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to resolve variable names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or any
    /// variable fails validation.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let database_url = env.required(DATABASE_URL)?;
        check_scheme(DATABASE_URL, &database_url, &["postgres://", "postgresql://"])?;
        let redis_url = env.optional(REDIS_URL);
        if let Some(url) = &redis_url {
            check_scheme(REDIS_URL, url, &["redis://", "rediss://"])?;
        }

        let config = Self {
            database_url,
            database_max_connections: env.positive(DB_MAX_CONNECTIONS, defaults::DB_MAX_CONNECTIONS)?,
            queue_backend: env.queue_backend()?,
            gamification: ConsumerSettings {
                concurrency: env.positive(
                    GAMIFICATION_CONCURRENCY,
                    defaults::GAMIFICATION_CONCURRENCY,
                )?,
                max_attempts: env.positive(GAMIFICATION_ATTEMPTS, defaults::GAMIFICATION_ATTEMPTS)?,
                backoff: env.millis(GAMIFICATION_BACKOFF_MS, defaults::GAMIFICATION_BACKOFF_MS)?,
            },
            notifications: ConsumerSettings {
                concurrency: env.positive(
                    NOTIFICATION_CONCURRENCY,
                    defaults::NOTIFICATION_CONCURRENCY,
                )?,
                max_attempts: env.positive(NOTIFICATION_ATTEMPTS, defaults::NOTIFICATION_ATTEMPTS)?,
                backoff: env.millis(NOTIFICATION_BACKOFF_MS, defaults::NOTIFICATION_BACKOFF_MS)?,
            },
            poll_interval: non_zero(
                POLL_INTERVAL_MS,
                env.millis(POLL_INTERVAL_MS, defaults::POLL_INTERVAL_MS)?,
            )?,
            dispatch_timeout: non_zero(
                DISPATCH_TIMEOUT_MS,
                env.millis(DISPATCH_TIMEOUT_MS, defaults::DISPATCH_TIMEOUT_MS)?,
            )?,
            cache: CacheSettings {
                redis_url,
                key: env
                    .optional(LEADERBOARD_KEY)
                    .unwrap_or_else(|| defaults::LEADERBOARD_KEY.to_string()),
                ttl: Duration::from_secs(
                    env.positive(LEADERBOARD_TTL_SECS, defaults::LEADERBOARD_TTL_SECS)?,
                ),
                connect_attempts: env
                    .positive(CACHE_CONNECT_ATTEMPTS, defaults::CACHE_CONNECT_ATTEMPTS)?,
                connect_timeout: non_zero(
                    CACHE_CONNECT_TIMEOUT_MS,
                    env.millis(CACHE_CONNECT_TIMEOUT_MS, defaults::CACHE_CONNECT_TIMEOUT_MS)?,
                )?,
                command_timeout: non_zero(
                    CACHE_COMMAND_TIMEOUT_MS,
                    env.millis(CACHE_COMMAND_TIMEOUT_MS, defaults::CACHE_COMMAND_TIMEOUT_MS)?,
                )?,
                cooldown: env.millis(CACHE_COOLDOWN_MS, defaults::CACHE_COOLDOWN_MS)?,
            },
            log: LogSettings {
                level: env
                    .optional(LOG_LEVEL)
                    .unwrap_or_else(|| defaults::LOG_LEVEL.to_string()),
                format: env.log_format()?,
            },
        };

        debug!(
            queue_backend = config.queue_backend.as_str(),
            cache_enabled = config.cache.redis_url.is_some(),
            gamification_concurrency = config.gamification.concurrency,
            notification_concurrency = config.notifications.concurrency,
            "pipeline configuration loaded"
        );
        Ok(config)
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, field: &str) -> Option<String> {
        (self.lookup)(field)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, field: &'static str) -> ConfigResult<String> {
        self.optional(field).ok_or(ConfigError::Missing { field })
    }

    fn positive<T>(&self, field: &'static str, default: T) -> ConfigResult<T>
    where
        T: std::str::FromStr + PartialEq + Default,
    {
        let Some(raw) = self.optional(field) else {
            return Ok(default);
        };
        let parsed = raw.parse::<T>().map_err(|_| ConfigError::InvalidField {
            field,
            value: raw.clone(),
            reason: "must be a positive integer",
        })?;
        if parsed == T::default() {
            return Err(ConfigError::InvalidField {
                field,
                value: raw,
                reason: "must be greater than zero",
            });
        }
        Ok(parsed)
    }

    fn millis(&self, field: &'static str, default: u64) -> ConfigResult<Duration> {
        let Some(raw) = self.optional(field) else {
            return Ok(Duration::from_millis(default));
        };
        raw.parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidField {
                field,
                value: raw,
                reason: "must be a whole number of milliseconds",
            })
    }

    fn queue_backend(&self) -> ConfigResult<QueueBackend> {
        let Some(raw) = self.optional(QUEUE_BACKEND) else {
            return Ok(QueueBackend::default());
        };
        match raw.to_ascii_lowercase().as_str() {
            "postgres" => Ok(QueueBackend::Postgres),
            "memory" => Ok(QueueBackend::Memory),
            _ => Err(ConfigError::InvalidField {
                field: QUEUE_BACKEND,
                value: raw,
                reason: "must be 'postgres' or 'memory'",
            }),
        }
    }

    fn log_format(&self) -> ConfigResult<Option<String>> {
        let Some(raw) = self.optional(LOG_FORMAT) else {
            return Ok(None);
        };
        let normalized = raw.to_ascii_lowercase();
        match normalized.as_str() {
            "json" | "pretty" => Ok(Some(normalized)),
            _ => Err(ConfigError::InvalidField {
                field: LOG_FORMAT,
                value: raw,
                reason: "must be 'json' or 'pretty'",
            }),
        }
    }
}

fn check_scheme(field: &'static str, value: &str, schemes: &[&str]) -> ConfigResult<()> {
    if schemes.iter().any(|scheme| value.starts_with(scheme)) {
        Ok(())
    } else {
        Err(ConfigError::InvalidField {
            field,
            value: redact(value),
            reason: "unsupported connection scheme",
        })
    }
}

fn non_zero(field: &'static str, value: Duration) -> ConfigResult<Duration> {
    if value.is_zero() {
        return Err(ConfigError::InvalidField {
            field,
            value: "0".to_string(),
            reason: "must be greater than zero",
        });
    }
    Ok(value)
}

// Connection strings may carry credentials; keep only the scheme-ish prefix.
fn redact(value: &str) -> String {
    value.split_once("://").map_or_else(
        || "<redacted>".to_string(),
        |(scheme, _)| format!("{scheme}://<redacted>"),
    )
}
