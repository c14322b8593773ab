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

//! Configuration for the Pulse gamification worker.
//!
//! Layout: `defaults.rs` (fallback values), `model.rs` (typed settings),
//! `loader.rs` (environment parsing and validation), `error.rs`.

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;

pub use error::{ConfigError, ConfigResult};
pub use model::{
    CacheSettings, ConsumerSettings, LogSettings, PipelineConfig, QueueBackend,
};
