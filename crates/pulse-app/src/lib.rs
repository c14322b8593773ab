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

//! Pulse gamification pipeline wiring.
//!
//! Layout: `dispatcher.rs` (award entry point), `gamification.rs` and
//! `notifications.rs` (queue workers), `ranking.rs` (leaderboard read path),
//! `pipeline.rs` (service wiring), `bootstrap.rs` (worker process).

/// Worker process boot sequence.
pub mod bootstrap;
/// Award-XP dispatcher.
pub mod dispatcher;
/// Application error type.
pub mod error;
/// Gamification queue worker.
pub mod gamification;
/// Notification queue worker.
pub mod notifications;
/// Service wiring.
pub mod pipeline;
/// Global ranking read path.
pub mod ranking;

pub use bootstrap::{run_app, run_app_with};
pub use dispatcher::{AwardDispatcher, AwardRequest, DispatchStatus};
pub use error::{AppError, AppResult};
pub use gamification::{GamificationWorker, award_notifications};
pub use notifications::NotificationWorker;
pub use pipeline::{Pipeline, PipelineDeps, PipelineOptions};
pub use ranking::{MAX_PAGE_SIZE, RankingService};
