//! ahsnap Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the ahsnap workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the workspace-wide [`AhsnapError`] and [`Result`] alias
//! - **Logging**: [`logging::init_logging`] and its [`logging::LogConfig`]
//!
//! # Example
//!
//! ```no_run
//! use ahsnap_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{AhsnapError, Result};
