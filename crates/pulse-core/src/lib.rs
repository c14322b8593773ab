#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Storage-agnostic gamification domain: the level curve, award planning and
//! the traits implemented by the ledger, leaderboard and notification adapters.

pub mod error;
pub mod ledger;
pub mod levels;
pub mod model;
pub mod service;

pub use error::{LeaderboardError, LeaderboardResult};
pub use ledger::{AwardPlan, Eligibility, eligibility, plan_award};
pub use levels::{
    LEVEL_THRESHOLDS, LevelChange, MAX_LEVEL, OPEN_ENDED_INCREMENT, check_level_up, level_of,
    threshold_for,
};
pub use model::{
    AppliedAward, AuditRecord, AwardOutcome, LeaderboardEntry, LedgerEntry, Notification,
    NotificationStatus, RankingPage, RankingRow, RankingSource, UserProfile,
};
pub use service::{Leaderboard, NotificationStore, UserLedger};
