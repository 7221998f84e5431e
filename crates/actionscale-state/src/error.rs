//! Error types for the cache state store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors raised by a state backend. A missing key is never an error.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("cache server unreachable, aborting to avoid potential rate limiting: {0}")]
    Unreachable(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("failed to connect to cache server: {0}")]
    Connect(String),

    #[error("cache operation timed out: {0}")]
    Timeout(String),
}
