//! Pitlane Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling, logging setup and run report types for the
//! Pitlane ingestion workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`PitlaneError`] and the [`Result`] alias
//! - **Logging**: [`logging::LogConfig`] and [`logging::init_logging`]
//! - **Types**: session types, upsert outcomes, stage counters and run reports
//!
//! # Example
//!
//! ```no_run
//! use pitlane_common::types::{StageStats, UpsertOutcome};
//!
//! let mut stats = StageStats::new("seasons");
//! stats.record(UpsertOutcome::Created);
//! stats.complete();
//! assert_eq!(stats.created, 1);
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{PitlaneError, Result};
