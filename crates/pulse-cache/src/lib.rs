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

//! Leaderboard cache adapters.
//!
//! [`RedisLeaderboard`] keeps colaborador XP in a Redis sorted set and fails
//! fast when Redis is unreachable, so the ranking read path can fall back to
//! the ledger without stalling a request. [`DisabledLeaderboard`] stands in
//! when no Redis endpoint is configured.

pub mod disabled;
pub mod redis_board;
pub mod settings;

pub use disabled::DisabledLeaderboard;
pub use redis_board::RedisLeaderboard;
pub use settings::{DEFAULT_LEADERBOARD_KEY, LeaderboardSettings};
