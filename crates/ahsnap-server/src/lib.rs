//! ahsnap Server Library
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//!
//! HTTP query API over the auction snapshot.
//!
//! # Endpoints
//!
//! - `GET /` and `GET /skyblock/auctions`: filter, sort, page and project the
//!   current snapshot (requires `key`)
//! - `GET /information`: ingestion status and request counters
//! - `GET /health`: liveness

pub mod config;
pub mod error;
pub mod middleware;
pub mod query;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;
