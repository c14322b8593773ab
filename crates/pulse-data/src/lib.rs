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

//! Postgres persistence for Pulse: the user ledger with its audit trail, the
//! notification repository, and the durable job queue.

pub mod error;
pub mod ledger;
pub mod notifications;
pub mod queue;

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub use error::{DataError, Result as DataResult};
pub use ledger::LedgerStore;
pub use notifications::NotificationRepository;
pub use queue::{PgJobQueue, QueueCounts};

/// Open a connection pool.
///
/// # Errors
///
/// Returns an error when the database cannot be reached within `acquire_timeout`.
pub async fn connect(
    url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> DataResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(url)
        .await
        .map_err(|source| DataError::QueryFailed {
            operation: "connect",
            source,
        })
}

/// Apply the ledger, notification and queue migrations.
///
/// # Errors
///
/// Returns an error when migration execution fails.
pub async fn run_migrations(pool: &PgPool) -> DataResult<()> {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
        .run(pool)
        .await
        .map_err(|source| DataError::MigrationFailed { source })?;
    Ok(())
}

pub(crate) fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub(crate) fn widen_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}
