//! Error types for the cache layer
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache layer.
#[derive(Error, Debug)]
pub enum CacheError {
    /// No backing store client configured
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid caller input (bad score, empty id, undefined value, invalid batch)
    #[error("Usage error: {0}")]
    Usage(String),

    /// Stored payload could not be deserialized
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Value could not be encoded for storage
    #[error("Serialize error: {0}")]
    Serialize(String),

    /// Backing store transport or protocol failure
    #[error("Store error: {0}")]
    Store(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Store(err.to_string())
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Store(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;
