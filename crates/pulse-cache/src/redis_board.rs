//! Redis sorted-set implementation of [`Leaderboard`].
//!
//! Scores are stored as `ZADD key xp user_id` with a TTL refreshed on each
//! write. The connection is opened lazily and shared; when every connection
//! attempt fails the client stops trying for a cool-down period and reports
//! [`LeaderboardError::Unavailable`] straight away. Each command is bounded by
//! `command_timeout`; a command that times out also drops the connection.

use std::future::Future;

use async_trait::async_trait;
use pulse_core::{Leaderboard, LeaderboardEntry, LeaderboardError, LeaderboardResult};
use pulse_events::UserId;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError, RedisResult};
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use crate::settings::LeaderboardSettings;

const COOLING_DOWN: &str = "cooling down after failed connection attempts";

enum ConnectionState {
    Idle,
    Ready(MultiplexedConnection),
    CoolingDown { until: Instant },
}

/// Leaderboard backed by a Redis sorted set.
pub struct RedisLeaderboard {
    client: redis::Client,
    settings: LeaderboardSettings,
    state: Mutex<ConnectionState>,
}

impl RedisLeaderboard {
    /// Build a client for `url`. No connection is made until the first call.
    ///
    /// # Errors
    ///
    /// Returns [`LeaderboardError::Command`] if the URL cannot be parsed.
    pub fn new(url: &str, settings: LeaderboardSettings) -> LeaderboardResult<Self> {
        let client = redis::Client::open(url).map_err(|err| LeaderboardError::Command {
            operation: "open",
            source: Box::new(err),
        })?;
        Ok(Self {
            client,
            settings,
            state: Mutex::new(ConnectionState::Idle),
        })
    }

    /// Settings in effect.
    #[must_use]
    pub const fn settings(&self) -> &LeaderboardSettings {
        &self.settings
    }

    async fn connection(
        &self,
        operation: &'static str,
    ) -> LeaderboardResult<MultiplexedConnection> {
        let mut state = self.state.lock().await;
        match &*state {
            ConnectionState::Ready(conn) => return Ok(conn.clone()),
            ConnectionState::CoolingDown { until } if Instant::now() < *until => {
                return Err(LeaderboardError::Unavailable {
                    operation,
                    detail: COOLING_DOWN.to_string(),
                });
            }
            ConnectionState::CoolingDown { .. } | ConnectionState::Idle => {}
        }

        let attempts = self.settings.connect_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match timeout(
                self.settings.connect_timeout,
                self.client.get_multiplexed_async_connection(),
            )
            .await
            {
                Ok(Ok(conn)) => {
                    debug!(attempt, "leaderboard cache connected");
                    *state = ConnectionState::Ready(conn.clone());
                    return Ok(conn);
                }
                Ok(Err(err)) => last_error = err.to_string(),
                Err(_) => {
                    last_error = format!(
                        "connect timed out after {} ms",
                        self.settings.connect_timeout.as_millis()
                    );
                }
            }
            debug!(attempt, error = %last_error, "leaderboard cache connect attempt failed");
        }

        warn!(
            attempts,
            cooldown_ms = u64::try_from(self.settings.cooldown.as_millis()).unwrap_or(u64::MAX),
            error = %last_error,
            "leaderboard cache unreachable"
        );
        *state = ConnectionState::CoolingDown {
            until: Instant::now() + self.settings.cooldown,
        };
        Err(LeaderboardError::Unavailable {
            operation,
            detail: last_error,
        })
    }

    async fn command_failed(&self, operation: &'static str, err: RedisError) -> LeaderboardError {
        let mut state = self.state.lock().await;
        if matches!(*state, ConnectionState::Ready(_)) {
            *state = ConnectionState::Idle;
        }
        drop(state);
        warn!(operation, error = %err, "leaderboard command failed");
        LeaderboardError::Command {
            operation,
            source: Box::new(err),
        }
    }

    async fn run<T, F>(&self, operation: &'static str, command: F) -> LeaderboardResult<T>
    where
        T: Send,
        F: Future<Output = RedisResult<T>> + Send,
    {
        match timeout(self.settings.command_timeout, command).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(self.command_failed(operation, err).await),
            Err(_) => Err(self.command_timed_out(operation).await),
        }
    }

    async fn command_timed_out(&self, operation: &'static str) -> LeaderboardError {
        let mut state = self.state.lock().await;
        if matches!(*state, ConnectionState::Ready(_)) {
            *state = ConnectionState::Idle;
        }
        drop(state);
        let detail = format!(
            "command timed out after {} ms",
            self.settings.command_timeout.as_millis()
        );
        warn!(operation, error = %detail, "leaderboard command stalled");
        LeaderboardError::Unavailable { operation, detail }
    }
}

#[async_trait]
impl Leaderboard for RedisLeaderboard {
    async fn update_score(&self, user_id: UserId, xp: u64) -> LeaderboardResult<()> {
        let mut conn = self.connection("update_score").await?;
        let mut pipe = redis::pipe();
        pipe.zadd(&self.settings.key, user_id.to_string(), xp)
            .ignore()
            .expire(&self.settings.key, self.settings.ttl_secs())
            .ignore();
        self.run("update_score", pipe.query_async(&mut conn)).await
    }

    async fn replace_scores(&self, scores: &[(UserId, u64)]) -> LeaderboardResult<()> {
        let mut conn = self.connection("replace_scores").await?;
        let mut pipe = redis::pipe();
        pipe.atomic().del(&self.settings.key).ignore();
        for (user_id, xp) in scores {
            pipe.zadd(&self.settings.key, user_id.to_string(), *xp).ignore();
        }
        if !scores.is_empty() {
            pipe.expire(&self.settings.key, self.settings.ttl_secs()).ignore();
        }
        self.run("replace_scores", pipe.query_async(&mut conn)).await
    }

    async fn remove(&self, user_id: UserId) -> LeaderboardResult<()> {
        let mut conn = self.connection("remove").await?;
        let removed: u64 = self
            .run("remove", conn.zrem(&self.settings.key, user_id.to_string()))
            .await?;
        debug!(user_id = %user_id, removed, "leaderboard member removed");
        Ok(())
    }

    async fn top_n(&self, offset: u64, limit: u64) -> LeaderboardResult<Vec<LeaderboardEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let start = isize::try_from(offset).map_err(|_| LeaderboardError::Malformed {
            operation: "top_n",
            detail: format!("offset {offset} out of range"),
        })?;
        let stop = isize::try_from(offset.saturating_add(limit - 1)).unwrap_or(isize::MAX);

        let mut conn = self.connection("top_n").await?;
        let rows: Vec<(String, u64)> = self
            .run("top_n", conn.zrevrange_withscores(&self.settings.key, start, stop))
            .await?;

        rows.into_iter()
            .zip(offset.saturating_add(1)..)
            .map(|((member, xp), rank)| {
                let user_id = member.parse::<UserId>().map_err(|_| LeaderboardError::Malformed {
                    operation: "top_n",
                    detail: format!("member '{member}' is not a user id"),
                })?;
                Ok(LeaderboardEntry { user_id, xp, rank })
            })
            .collect()
    }

    async fn rank(&self, user_id: UserId) -> LeaderboardResult<Option<u64>> {
        let mut conn = self.connection("rank").await?;
        let position: Option<u64> = self
            .run("rank", conn.zrevrank(&self.settings.key, user_id.to_string()))
            .await?;
        Ok(position.map(|zero_based| zero_based.saturating_add(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use uuid::Uuid;

    fn unreachable(cooldown: Duration) -> RedisLeaderboard {
        let settings = LeaderboardSettings {
            connect_attempts: 2,
            connect_timeout: Duration::from_millis(200),
            cooldown,
            ..LeaderboardSettings::default()
        };
        RedisLeaderboard::new("redis://127.0.0.1:1/", settings).expect("valid url")
    }

    #[test]
    fn rejects_unparseable_url() {
        let err = RedisLeaderboard::new("not a redis url", LeaderboardSettings::default()).err();
        assert_eq!(err.map(|err| err.operation()), Some("open"));
    }

    #[tokio::test]
    async fn unreachable_cache_reports_unavailable_then_cools_down() {
        let board = unreachable(Duration::from_secs(60));

        let first = board.top_n(0, 10).await;
        assert!(matches!(
            first,
            Err(LeaderboardError::Unavailable { operation: "top_n", .. })
        ));

        let started = std::time::Instant::now();
        let second = board.rank(Uuid::new_v4()).await;
        match second {
            Err(LeaderboardError::Unavailable { operation, detail }) => {
                assert_eq!(operation, "rank");
                assert_eq!(detail, COOLING_DOWN);
            }
            other => panic!("expected cool-down, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn expired_cooldown_retries_the_connection() {
        let board = unreachable(Duration::ZERO);
        assert!(board.update_score(Uuid::new_v4(), 5).await.is_err());

        match board.update_score(Uuid::new_v4(), 5).await {
            Err(LeaderboardError::Unavailable { detail, .. }) => assert_ne!(detail, COOLING_DOWN),
            other => panic!("expected a fresh connection failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_page_request_skips_the_network() {
        let board = unreachable(Duration::from_secs(60));
        assert!(board.top_n(0, 0).await.expect("no-op").is_empty());
    }

    // Accepts connections and answers the client handshake, then never
    // replies to a data command.
    async fn stalled_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0_u8; 4_096];
                    while let Ok(read) = socket.read(&mut buf).await {
                        if read == 0 {
                            break;
                        }
                        let handshakes = buf[..read]
                            .windows(7)
                            .filter(|window| *window == b"SETINFO")
                            .count();
                        for _ in 0..handshakes {
                            if socket.write_all(b"+OK\r\n").await.is_err() {
                                return;
                            }
                        }
                    }
                });
            }
        });
        format!("redis://{addr}/")
    }

    #[tokio::test]
    async fn stalled_commands_time_out_as_unavailable() {
        let settings = LeaderboardSettings {
            connect_attempts: 1,
            connect_timeout: Duration::from_secs(2),
            command_timeout: Duration::from_millis(100),
            ..LeaderboardSettings::default()
        };
        let board = RedisLeaderboard::new(&stalled_server().await, settings).expect("valid url");

        let started = std::time::Instant::now();
        match board.top_n(0, 10).await {
            Err(LeaderboardError::Unavailable { operation, detail }) => {
                assert_eq!(operation, "top_n");
                assert!(detail.contains("timed out"), "{detail}");
            }
            other => panic!("expected a command timeout, got {other:?}"),
        }
        assert!(matches!(
            board.rank(Uuid::new_v4()).await,
            Err(LeaderboardError::Unavailable { operation: "rank", .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
