//! event-digest-core library.
//!
//! Memoized per-file digests (event count + hour bucket) over hourly gzip
//! event logs, plus the summary and roster artifacts built from them.
//!
//! # Conventions
//!
//! - **Errors**: per-file failures are `thiserror` enums carrying an
//!   [`error::ErrorCode`]; run-level failures use `anyhow::Result`.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod cache;
pub mod config;
pub mod digest;
pub mod error;
pub mod lock;
pub mod pipeline;
pub mod roster;
pub mod sanitize;
pub mod summary;
pub mod users;

pub use cache::{DigestCache, FileOutcome};
pub use digest::Digest;
pub use pipeline::{Pipeline, RunReport};
pub use users::{Username, UsernameSet};
