//! Error types for sacred-reader
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// sacred-reader error types
#[derive(Error, Debug)]
pub enum Error {
    /// A required file or directory is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// A document or timestamp could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Caller supplied an unknown run key, artifact, or malformed input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Metadata lacks a field required to derive a value
    #[error("Missing field in run metadata: {0}")]
    MissingField(String),

    /// Storage error (Parquet)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}
