//! Ingestion error types

use thiserror::Error;

/// Result type alias for ingestion operations
pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Failures of the ingestion pipeline
///
/// Page-level variants (`Upstream`, `Timeout`) are recovered by the
/// orchestrator; `CycleFatal` aborts a cycle before any snapshot write.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Upstream error on page {page}: {message}")]
    Upstream { page: u32, message: String },

    #[error("Fetch of page {page} timed out after {secs}s")]
    Timeout { page: u32, secs: u64 },

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Cycle aborted: {0}")]
    CycleFatal(Box<IngestError>),

    #[error("Snapshot store error: {0}")]
    Snapshot(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IngestError {
    pub fn upstream(page: u32, message: impl Into<String>) -> Self {
        IngestError::Upstream {
            page,
            message: message.into(),
        }
    }

    /// Wrap a page-0 failure as fatal for the cycle
    pub fn fatal(inner: IngestError) -> Self {
        match inner {
            IngestError::CycleFatal(_) => inner,
            other => IngestError::CycleFatal(Box::new(other)),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, IngestError::CycleFatal(_))
    }
}

impl From<ahsnap_common::AhsnapError> for IngestError {
    fn from(err: ahsnap_common::AhsnapError) -> Self {
        IngestError::Snapshot(err.to_string())
    }
}

/// Failures while decoding an item payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid base64: {0}")]
    Base64(String),

    #[error("invalid gzip stream: {0}")]
    Gzip(String),

    #[error("unexpected end of data at offset {offset}")]
    Truncated { offset: usize },

    #[error("unknown tag id {id} at offset {offset}")]
    UnknownTag { id: u8, offset: usize },

    #[error("negative length {len} at offset {offset}")]
    NegativeLength { len: i32, offset: usize },

    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),

    #[error("root tag must be a compound, found tag id {0}")]
    RootNotCompound(u8),

    #[error("missing attribute: {0}")]
    MissingAttribute(&'static str),
}
