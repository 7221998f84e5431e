//! Error types for the query orchestrator.

use thiserror::Error;

use actionscale_client::ClientError;
use actionscale_core::ConfigError;
use actionscale_state::StateError;

/// Result type alias for host operations.
pub type HostResult<T> = Result<T, HostError>;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("metric not found: {0}")]
    MetricNotFound(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Every failure of a warm-up pass, one per line.
    #[error("{0}")]
    WarmUp(String),
}

impl HostError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, HostError::MetricNotFound(_))
    }
}
