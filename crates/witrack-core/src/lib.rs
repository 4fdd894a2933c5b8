//! witrack-core: dynamic work item schemas and their SQLite store.
//!
//! # Conventions
//!
//! - **Errors**: repositories and the field engine return [`Result`] with
//!   the typed [`Error`]; store bootstrap and config loading use
//!   `anyhow::Result` with context.
//! - **Logging**: `tracing` macros; loads at `debug!`, writes at `info!`,
//!   rejected invariants at `warn!`.
//! - **Timing**: repository operations run under [`timing::timed`].

pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod paging;
pub mod query;
pub mod system;
pub mod timing;

pub use error::{Error, ErrorCode, Result};
