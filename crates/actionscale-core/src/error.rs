//! Configuration error types.

use thiserror::Error;

/// Result type alias for configuration parsing and validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid duration '{0}'")]
    Duration(String),

    #[error("invalid scaling for {name}: {reason}")]
    Scaling { name: String, reason: String },

    #[error("workflow {name} has no token: {reason}")]
    MissingToken { name: String, reason: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}
