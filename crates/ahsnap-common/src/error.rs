//! Error types for ahsnap

use thiserror::Error;

/// Result type alias for ahsnap operations
pub type Result<T> = std::result::Result<T, AhsnapError>;

/// Workspace-wide error type
#[derive(Error, Debug)]
pub enum AhsnapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
