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

//! Event payloads and queue plumbing for the Pulse gamification pipeline.
//!
//! Route handlers produce [`GamificationEvent`]s; the gamification worker turns
//! them into ledger updates and produces [`NotificationEvent`]s. Both travel on a
//! [`JobQueue`] with at-least-once delivery and a per-queue [`RetryPolicy`].
//!
//! Layout: `payloads.rs` (message types), `error.rs` (queue errors),
//! `queue/` (queue trait, retry policy, in-memory backend, consumer loop).

pub mod error;
pub mod payloads;
pub mod queue;

pub use error::{QueueError, QueueResult, UnknownLabel};
pub use payloads::{
    Action, AwardContext, GamificationEvent, NotificationEvent, NotificationKind, Reward, Role,
    UserId,
};
pub use queue::{
    Backoff, ClaimedJob, Consumer, ConsumerHandle, ConsumerOptions, Job, JobDisposition,
    JobHandler, JobId, JobQueue, MemoryQueue, QueueName, RetryDecision, RetryPolicy,
};
