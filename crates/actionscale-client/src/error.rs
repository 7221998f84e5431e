//! Error types for data sources and the caching client.

use thiserror::Error;

use actionscale_state::StateError;

/// Result type alias for data-source calls.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type alias for caching-client calls.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised by an upstream data source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("http request failed: {0}")]
    Http(String),

    #[error("{url} returned status {status}")]
    Status { status: u16, url: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("data source call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Errors raised by [`CachingClient`](crate::CachingClient).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to fetch data for {name}: {source}")]
    Fetch {
        name: String,
        #[source]
        source: SourceError,
    },

    #[error(transparent)]
    State(#[from] StateError),

    #[error("Encountered error {fetch}. Also errored on save {persist}")]
    FetchAndPersist {
        fetch: SourceError,
        persist: StateError,
    },
}
