//! Award planning shared by every [`UserLedger`](crate::UserLedger) implementation.
//!
//! Adapters load the entry under a row lock, call [`eligibility`] and
//! [`plan_award`], then persist the plan verbatim. Level and threshold are never
//! taken from callers.

use pulse_events::{GamificationEvent, Role};

use crate::levels::{LevelChange, check_level_up, threshold_for};
use crate::model::{AppliedAward, AwardOutcome, LedgerEntry};

/// Whether an entry may receive an award.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// Active user with a reward-earning role.
    Eligible,
    /// No entry, or the user is deactivated.
    MissingUser,
    /// Stored role does not earn rewards.
    Ineligible {
        /// Stored role.
        role: Role,
    },
}

impl Eligibility {
    /// Outcome to report when the award is skipped; `None` when eligible.
    #[must_use]
    pub const fn skip_outcome(self) -> Option<AwardOutcome> {
        match self {
            Self::Eligible => None,
            Self::MissingUser => Some(AwardOutcome::MissingUser),
            Self::Ineligible { role } => Some(AwardOutcome::Ineligible { role }),
        }
    }
}

/// Check the stored entry, never the role embedded in the event.
#[must_use]
pub const fn eligibility(entry: Option<&LedgerEntry>) -> Eligibility {
    match entry {
        None => Eligibility::MissingUser,
        Some(entry) if !entry.active => Eligibility::MissingUser,
        Some(entry) if !entry.role.earns_rewards() => Eligibility::Ineligible { role: entry.role },
        Some(_) => Eligibility::Eligible,
    }
}

/// New ledger values for an eligible entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AwardPlan {
    /// XP after the award.
    pub xp: u64,
    /// Stars after the award.
    pub stars: u64,
    /// `level_of(xp)`.
    pub level: u32,
    /// `threshold_for(level)`.
    pub xp_next_threshold: u64,
    /// Level comparison against the stored XP.
    pub level_change: LevelChange,
}

/// Add the deltas to `entry` and derive level and threshold.
#[must_use]
pub fn plan_award(entry: &LedgerEntry, xp: u32, stars: u32) -> AwardPlan {
    let new_xp = entry.xp.saturating_add(u64::from(xp));
    let new_stars = entry.stars.saturating_add(u64::from(stars));
    let level_change = check_level_up(entry.xp, new_xp);
    AwardPlan {
        xp: new_xp,
        stars: new_stars,
        level: level_change.new_level,
        xp_next_threshold: threshold_for(level_change.new_level),
        level_change,
    }
}

impl AwardPlan {
    /// Apply the plan to an in-memory entry.
    pub const fn apply_to(&self, entry: &mut LedgerEntry) {
        entry.xp = self.xp;
        entry.stars = self.stars;
        entry.level = self.level;
        entry.xp_next_threshold = self.xp_next_threshold;
    }

    /// Describe the committed plan for `event`.
    #[must_use]
    pub fn into_applied(self, event: &GamificationEvent) -> AppliedAward {
        AppliedAward {
            user_id: event.user_id,
            action: event.action,
            xp_delta: event.xp,
            stars_delta: event.stars,
            xp: self.xp,
            stars: self.stars,
            level: self.level,
            xp_next_threshold: self.xp_next_threshold,
            level_change: self.level_change,
        }
    }
}
