//! User ledger and XP audit trail.

use anyhow::{Context, Result};
use async_trait::async_trait;
use pulse_core::{
    AuditRecord, AwardOutcome, LedgerEntry, UserLedger, UserProfile, eligibility, plan_award,
};
use pulse_events::{Action, GamificationEvent, Role, UserId};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::{clamp_i64, widen_u64};

const SELECT_ENTRY_FOR_UPDATE: &str = r"
    SELECT id, role, active, xp, stars, level, xp_next_threshold
    FROM pulse.users
    WHERE id = $1
    FOR UPDATE
";

const SELECT_ENTRY: &str = r"
    SELECT id, role, active, xp, stars, level, xp_next_threshold
    FROM pulse.users
    WHERE id = $1
";

const UPDATE_PROGRESS: &str = r"
    UPDATE pulse.users
    SET xp = $2,
        stars = $3,
        level = $4,
        xp_next_threshold = $5,
        updated_at = now()
    WHERE id = $1
";

const INSERT_AUDIT: &str = r"
    INSERT INTO pulse.xp_audit (
        user_id, action, xp_delta, stars_delta, xp_total, stars_total,
        leveled_up, old_level, new_level, context
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
";

const SELECT_TOP_COLABORADORES: &str = r"
    SELECT id, name, avatar_url, department, level, xp
    FROM pulse.users
    WHERE role = 'colaborador' AND active
    ORDER BY xp DESC, id DESC
    LIMIT $1 OFFSET $2
";

const SELECT_COLABORADOR_SCORES: &str = r"
    SELECT id, xp
    FROM pulse.users
    WHERE role = 'colaborador' AND active
";

const SELECT_RANKED_PROFILES: &str = r"
    SELECT id, name, avatar_url, department, level, xp
    FROM pulse.users
    WHERE id = ANY($1) AND role = 'colaborador' AND active
";

const SELECT_HISTORY: &str = r"
    SELECT id, user_id, action, xp_delta, stars_delta, xp_total, stars_total,
           leveled_up, old_level, new_level, context, created_at
    FROM pulse.xp_audit
    WHERE user_id = $1
    ORDER BY created_at DESC, id DESC
    LIMIT $2
";

/// Postgres-backed [`UserLedger`].
#[derive(Clone)]
pub struct LedgerStore {
    pool: PgPool,
}

impl LedgerStore {
    /// Wrap an existing pool. Migrations must already be applied.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Most recent audit records for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn xp_history(&self, user_id: UserId, limit: u32) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query(SELECT_HISTORY)
            .bind(user_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .context("failed to load xp history")?;
        rows.iter().map(decode_audit).collect()
    }
}

#[async_trait]
impl UserLedger for LedgerStore {
    async fn apply_award(&self, event: &GamificationEvent) -> Result<AwardOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to open ledger transaction")?;

        let row = sqlx::query(SELECT_ENTRY_FOR_UPDATE)
            .bind(event.user_id)
            .fetch_optional(&mut *tx)
            .await
            .context("failed to lock ledger entry")?;
        let entry = row.as_ref().map(decode_entry).transpose()?;

        if let Some(skipped) = eligibility(entry.as_ref()).skip_outcome() {
            tx.rollback()
                .await
                .context("failed to release ledger entry")?;
            return Ok(skipped);
        }
        let Some(entry) = entry else {
            return Ok(AwardOutcome::MissingUser);
        };

        let plan = plan_award(&entry, event.xp, event.stars);
        sqlx::query(UPDATE_PROGRESS)
            .bind(event.user_id)
            .bind(clamp_i64(plan.xp))
            .bind(clamp_i64(plan.stars))
            .bind(level_to_db(plan.level))
            .bind(clamp_i64(plan.xp_next_threshold))
            .execute(&mut *tx)
            .await
            .context("failed to update ledger entry")?;

        sqlx::query(INSERT_AUDIT)
            .bind(event.user_id)
            .bind(event.action.as_str())
            .bind(i64::from(event.xp))
            .bind(i64::from(event.stars))
            .bind(clamp_i64(plan.xp))
            .bind(clamp_i64(plan.stars))
            .bind(plan.level_change.leveled_up)
            .bind(level_to_db(plan.level_change.old_level))
            .bind(level_to_db(plan.level_change.new_level))
            .bind(Json(event.context.clone().into_value()))
            .execute(&mut *tx)
            .await
            .context("failed to append xp audit record")?;

        tx.commit()
            .await
            .context("failed to commit ledger transaction")?;

        debug!(
            user_id = %event.user_id,
            action = %event.action,
            xp = plan.xp,
            level = plan.level,
            "ledger award committed"
        );
        Ok(AwardOutcome::Applied(plan.into_applied(event)))
    }

    async fn entry(&self, user_id: UserId) -> Result<Option<LedgerEntry>> {
        let row = sqlx::query(SELECT_ENTRY)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load ledger entry")?;
        row.as_ref().map(decode_entry).transpose()
    }

    async fn top_colaboradores(&self, offset: u64, limit: u64) -> Result<Vec<UserProfile>> {
        let rows = sqlx::query(SELECT_TOP_COLABORADORES)
            .bind(clamp_i64(limit))
            .bind(clamp_i64(offset))
            .fetch_all(&self.pool)
            .await
            .context("failed to query colaborador ranking")?;
        rows.iter().map(decode_profile).collect()
    }

    async fn colaborador_scores(&self) -> Result<Vec<(UserId, u64)>> {
        let rows = sqlx::query(SELECT_COLABORADOR_SCORES)
            .fetch_all(&self.pool)
            .await
            .context("failed to load colaborador scores")?;
        rows.iter().map(decode_score).collect()
    }

    async fn ranked_profiles(&self, ids: &[UserId]) -> Result<Vec<UserProfile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(SELECT_RANKED_PROFILES)
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await
            .context("failed to load ranked profiles")?;
        rows.iter().map(decode_profile).collect()
    }
}

fn level_to_db(level: u32) -> i32 {
    i32::try_from(level).unwrap_or(i32::MAX)
}

fn level_from_db(level: i32) -> u32 {
    u32::try_from(level).unwrap_or(1).max(1)
}

fn decode_entry(row: &PgRow) -> Result<LedgerEntry> {
    let role: String = row.try_get("role")?;
    Ok(LedgerEntry {
        user_id: row.try_get("id")?,
        role: role
            .parse::<Role>()
            .with_context(|| format!("unrecognised role '{role}' on ledger entry"))?,
        active: row.try_get("active")?,
        xp: widen_u64(row.try_get("xp")?),
        stars: widen_u64(row.try_get("stars")?),
        level: level_from_db(row.try_get("level")?),
        xp_next_threshold: widen_u64(row.try_get("xp_next_threshold")?),
    })
}

fn decode_score(row: &PgRow) -> Result<(UserId, u64)> {
    Ok((row.try_get("id")?, widen_u64(row.try_get("xp")?)))
}

fn decode_profile(row: &PgRow) -> Result<UserProfile> {
    Ok(UserProfile {
        user_id: row.try_get("id")?,
        name: row.try_get("name")?,
        avatar_url: row.try_get("avatar_url")?,
        department: row.try_get("department")?,
        level: level_from_db(row.try_get("level")?),
        xp: widen_u64(row.try_get("xp")?),
    })
}

fn decode_audit(row: &PgRow) -> Result<AuditRecord> {
    let action: String = row.try_get("action")?;
    let Json(context) = row.try_get::<Json<serde_json::Value>, _>("context")?;
    Ok(AuditRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        action: action
            .parse::<Action>()
            .with_context(|| format!("unrecognised action '{action}' in audit trail"))?,
        xp_delta: u32::try_from(row.try_get::<i64, _>("xp_delta")?).unwrap_or(u32::MAX),
        stars_delta: u32::try_from(row.try_get::<i64, _>("stars_delta")?).unwrap_or(u32::MAX),
        xp_total: widen_u64(row.try_get("xp_total")?),
        stars_total: widen_u64(row.try_get("stars_total")?),
        leveled_up: row.try_get("leveled_up")?,
        old_level: level_from_db(row.try_get("old_level")?),
        new_level: level_from_db(row.try_get("new_level")?),
        context,
        created_at: row.try_get("created_at")?,
    })
}
