//! Selector parse errors.

use thiserror::Error;

/// Result type alias for selector parsing.
pub type SelectorResult<T> = Result<T, SelectorError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("unable to parse selector '{input}': {reason}")]
    Parse { input: String, reason: String },

    #[error("invalid label key '{0}'")]
    InvalidKey(String),

    #[error("invalid label value '{0}'")]
    InvalidValue(String),
}
