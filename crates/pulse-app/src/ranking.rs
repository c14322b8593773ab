//! Global ranking read path.
//!
//! Pages come from the leaderboard cache when it has data. An empty cache
//! falls back to a direct ledger query and is then rebuilt from every ranked
//! colaborador, so later pages served from the cache carry global ranks. A
//! cached member the ledger no longer ranks (deleted, inactive, or no longer
//! a colaborador) is evicted and the page is served from the ledger instead.
//! An unreachable cache only triggers the ledger read.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use pulse_core::{
    Leaderboard, LeaderboardEntry, RankingPage, RankingRow, RankingSource, UserLedger,
    UserProfile,
};
use pulse_events::UserId;
use pulse_telemetry::Metrics;
use tracing::{debug, warn};

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Serves the colaborador leaderboard.
#[derive(Clone)]
pub struct RankingService {
    ledger: Arc<dyn UserLedger>,
    leaderboard: Arc<dyn Leaderboard>,
    metrics: Metrics,
}

impl RankingService {
    /// Build the service over the authoritative ledger and its cache.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn UserLedger>,
        leaderboard: Arc<dyn Leaderboard>,
        metrics: Metrics,
    ) -> Self {
        Self {
            ledger,
            leaderboard,
            metrics,
        }
    }

    /// Ranking page starting after `offset` entries. `limit` is clamped to
    /// `1..=MAX_PAGE_SIZE`.
    ///
    /// `current_user_rank` comes from the cache only and is `None` when the
    /// cache cannot answer.
    ///
    /// # Errors
    ///
    /// Returns an error when the ledger cannot be queried.
    pub async fn global_ranking(
        &self,
        offset: u64,
        limit: u64,
        requesting_user: UserId,
    ) -> anyhow::Result<RankingPage> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);

        match self.leaderboard.top_n(offset, limit).await {
            Ok(entries) if !entries.is_empty() => {
                if let Some(page) = self.cached_page(entries, requesting_user).await? {
                    return Ok(page);
                }
            }
            Ok(_) => debug!(offset, limit, "leaderboard cache empty; reading ledger"),
            Err(err) => {
                self.metrics.inc_leaderboard_error(err.operation());
                warn!(error = %err, "leaderboard cache unavailable; reading ledger");
                return self.ledger_page(offset, limit, requesting_user).await;
            }
        }
        self.rebuild_board().await;
        self.ledger_page(offset, limit, requesting_user).await
    }

    /// `None` when a cached member is no longer ranked by the ledger; those
    /// members have been evicted by the time this returns.
    async fn cached_page(
        &self,
        entries: Vec<LeaderboardEntry>,
        requesting_user: UserId,
    ) -> anyhow::Result<Option<RankingPage>> {
        let ids: Vec<UserId> = entries.iter().map(|entry| entry.user_id).collect();
        let profiles: HashMap<UserId, UserProfile> = self
            .ledger
            .ranked_profiles(&ids)
            .await
            .context("failed to load ranking profiles")?
            .into_iter()
            .map(|profile| (profile.user_id, profile))
            .collect();

        let stale: Vec<UserId> = ids
            .into_iter()
            .filter(|id| !profiles.contains_key(id))
            .collect();
        if !stale.is_empty() {
            debug!(stale = stale.len(), "cached leaderboard holds unranked members");
            for user_id in stale {
                self.evict(user_id).await;
            }
            return Ok(None);
        }

        let ranking = entries
            .into_iter()
            .filter_map(|entry| {
                profiles.get(&entry.user_id).map(|profile| RankingRow {
                    rank: entry.rank,
                    user_id: entry.user_id,
                    name: profile.name.clone(),
                    avatar_url: profile.avatar_url.clone(),
                    department: profile.department.clone(),
                    level: profile.level,
                    xp: entry.xp,
                    is_current_user: entry.user_id == requesting_user,
                })
            })
            .collect();

        Ok(Some(RankingPage {
            ranking,
            current_user_rank: self.cached_rank(requesting_user).await,
            source: RankingSource::Cache,
        }))
    }

    async fn ledger_page(
        &self,
        offset: u64,
        limit: u64,
        requesting_user: UserId,
    ) -> anyhow::Result<RankingPage> {
        self.metrics.inc_ranking_fallback();
        let profiles = self
            .ledger
            .top_colaboradores(offset, limit)
            .await
            .context("failed to query ledger ranking")?;

        let ranking = profiles
            .into_iter()
            .zip(offset.saturating_add(1)..)
            .map(|(profile, rank)| RankingRow {
                rank,
                is_current_user: profile.user_id == requesting_user,
                user_id: profile.user_id,
                name: profile.name,
                avatar_url: profile.avatar_url,
                department: profile.department,
                level: profile.level,
                xp: profile.xp,
            })
            .collect();

        Ok(RankingPage {
            ranking,
            current_user_rank: self.cached_rank(requesting_user).await,
            source: RankingSource::Ledger,
        })
    }

    // Best effort: a failed rebuild leaves the cache as it was.
    async fn rebuild_board(&self) {
        let scores = match self.ledger.colaborador_scores().await {
            Ok(scores) => scores,
            Err(err) => {
                debug!(error = %err, "leaderboard rebuild skipped");
                return;
            }
        };
        match self.leaderboard.replace_scores(&scores).await {
            Ok(()) => debug!(members = scores.len(), "leaderboard rebuilt from ledger"),
            Err(err) => {
                self.metrics.inc_leaderboard_error(err.operation());
                debug!(error = %err, "leaderboard rebuild skipped");
            }
        }
    }

    async fn evict(&self, user_id: UserId) {
        if let Err(err) = self.leaderboard.remove(user_id).await {
            self.metrics.inc_leaderboard_error(err.operation());
            debug!(user_id = %user_id, error = %err, "stale leaderboard member not evicted");
        }
    }

    async fn cached_rank(&self, user_id: UserId) -> Option<u64> {
        match self.leaderboard.rank(user_id).await {
            Ok(rank) => rank,
            Err(err) => {
                debug!(user_id = %user_id, error = %err, "current user rank unknown");
                None
            }
        }
    }
}
