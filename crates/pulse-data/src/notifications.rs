//! Persisted user-visible notifications.

use anyhow::{Context, Result};
use async_trait::async_trait;
use pulse_core::{Notification, NotificationStatus, NotificationStore};
use pulse_events::{NotificationEvent, NotificationKind, UserId};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::widen_u64;

const INSERT_NOTIFICATION: &str = r"
    INSERT INTO pulse.notifications (id, user_id, kind, title, message, data, status)
    VALUES ($1, $2, $3, $4, $5, $6, 'unread')
";

const SELECT_NOTIFICATIONS: &str = r"
    SELECT id, user_id, kind, title, message, data, status, created_at, read_at
    FROM pulse.notifications
    WHERE user_id = $1
      AND ($2 = FALSE OR status = 'unread')
    ORDER BY created_at DESC, id
    LIMIT $3
";

const MARK_READ: &str = r"
    UPDATE pulse.notifications
    SET status = 'read',
        read_at = COALESCE(read_at, now())
    WHERE id = $1 AND user_id = $2
";

const MARK_ALL_READ: &str = r"
    UPDATE pulse.notifications
    SET status = 'read',
        read_at = now()
    WHERE user_id = $1 AND status = 'unread'
";

const COUNT_UNREAD: &str = r"
    SELECT COUNT(*) AS unread
    FROM pulse.notifications
    WHERE user_id = $1 AND status = 'unread'
";

/// Postgres-backed notification store.
///
/// Inserts are not deduplicated; a retried job may store the same
/// notification twice.
#[derive(Clone)]
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    /// Wrap an existing pool. Migrations must already be applied.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Notifications for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn list(
        &self,
        user_id: UserId,
        unread_only: bool,
        limit: u32,
    ) -> Result<Vec<Notification>> {
        let rows = sqlx::query(SELECT_NOTIFICATIONS)
            .bind(user_id)
            .bind(unread_only)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .context("failed to list notifications")?;
        rows.iter().map(decode_notification).collect()
    }

    /// Mark one notification read. Returns `false` when it does not exist or
    /// belongs to another user. Repeated calls keep the first `read_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn mark_read(&self, user_id: UserId, id: Uuid) -> Result<bool> {
        let result = sqlx::query(MARK_READ)
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("failed to mark notification read")?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark every unread notification for a user read; returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn mark_all_read(&self, user_id: UserId) -> Result<u64> {
        let result = sqlx::query(MARK_ALL_READ)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("failed to mark notifications read")?;
        Ok(result.rows_affected())
    }

    /// Number of unread notifications for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn unread_count(&self, user_id: UserId) -> Result<u64> {
        let row = sqlx::query(COUNT_UNREAD)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .context("failed to count unread notifications")?;
        Ok(widen_u64(row.try_get("unread")?))
    }
}

#[async_trait]
impl NotificationStore for NotificationRepository {
    async fn insert(&self, event: &NotificationEvent) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(INSERT_NOTIFICATION)
            .bind(id)
            .bind(event.user_id)
            .bind(event.kind.as_str())
            .bind(&event.title)
            .bind(&event.message)
            .bind(Json(&event.data))
            .execute(&self.pool)
            .await
            .context("failed to insert notification")?;
        Ok(id)
    }
}

fn parse_status(label: &str) -> Result<NotificationStatus> {
    match label {
        "unread" => Ok(NotificationStatus::Unread),
        "read" => Ok(NotificationStatus::Read),
        other => anyhow::bail!("unrecognised notification status '{other}'"),
    }
}

fn decode_notification(row: &PgRow) -> Result<Notification> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let Json(data) = row.try_get::<Json<serde_json::Value>, _>("data")?;
    Ok(Notification {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        kind: kind
            .parse::<NotificationKind>()
            .with_context(|| format!("unrecognised notification kind '{kind}'"))?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        data,
        status: parse_status(&status)?,
        created_at: row.try_get("created_at")?,
        read_at: row.try_get("read_at")?,
    })
}
