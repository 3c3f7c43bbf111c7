//! Error types for cache operations
//!
//! Only write paths surface errors to callers. Read paths turn storage
//! problems into cache misses before they reach this type.

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Filesystem error while persisting a payload or metadata record
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Tabular payload could not be written as CSV
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

impl From<String> for CacheError {
    fn from(s: String) -> Self {
        CacheError::Other(s)
    }
}

impl From<&str> for CacheError {
    fn from(s: &str) -> Self {
        CacheError::Other(s.to_string())
    }
}
