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

//! Binary entrypoint that runs the gamification and notification consumers.

use pulse_app::{AppResult, run_app};

/// Bootstraps the worker and blocks until Ctrl-C.
#[tokio::main]
async fn main() -> AppResult<()> {
    run_app().await
}
