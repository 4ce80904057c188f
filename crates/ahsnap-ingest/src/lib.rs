//! ahsnap Ingest Library
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//!
//! Periodically snapshots a paginated auction catalog: every page is fetched
//! concurrently, item payloads are decoded, records are merged and the result
//! replaces the previously stored snapshot.
//!
//! # Components
//!
//! - [`fetcher`]: page retrieval and cache-header probing
//! - [`nbt`]: item payload decoding (base64, gzip, binary tag tree)
//! - [`extractor`]: filtering and record construction per page
//! - [`orchestrator`]: bounded concurrent fan-out over all pages of a cycle
//! - [`dedup`]: best-price and per-listing merging
//! - [`snapshot`]: memory, file and PostgreSQL snapshot stores plus the writer task
//! - [`poller`]: the cycle loop and its cache-driven sleep
//!
//! # Example
//!
//! ```no_run
//! use ahsnap_ingest::{config::IngestConfig, pipeline, status::SharedStatus};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let store = pipeline::open_store(&config).await?;
//!     let pipeline = pipeline::build(&config, store, SharedStatus::new(config.mode))?;
//!     let summary = pipeline.poller.run_once().await?;
//!     println!("{} records", summary.merged_records);
//!     Ok(())
//! }
//! ```

pub mod cache_hint;
pub mod config;
pub mod dedup;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod models;
pub mod nbt;
pub mod notify;
pub mod orchestrator;
pub mod pipeline;
pub mod poller;
pub mod snapshot;
pub mod status;

pub use error::{DecodeError, IngestError, IngestResult};
pub use models::{CanonicalRecord, ExtractionMode};
