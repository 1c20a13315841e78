//! Pitlane Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ingestion and reconciliation of Formula 1 data from two upstream APIs
//! into one relational store.
//!
//! # Sources
//!
//! - **Historical API**: Ergast-compatible, paginated, every season since 1950
//! - **Modern API**: OpenF1, flat arrays with session keys, weather and timing
//!
//! # Example
//!
//! ```no_run
//! use pitlane_ingest::config::IngestConfig;
//! use pitlane_ingest::coordinator::Coordinator;
//! use pitlane_ingest::stages::IngestContext;
//! use pitlane_ingest::store::PgStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::load()?;
//!     let store = PgStore::connect(&config.database).await?;
//!     let coordinator = Coordinator::new(IngestContext::new(Arc::new(store), config)?);
//!     let report = coordinator.run_current_year_pipeline(2024).await;
//!     println!("{}", report.to_json()?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod fetch;
pub mod models;
pub mod resolver;
pub mod scheduler;
pub mod stages;
pub mod store;
pub mod writer;
