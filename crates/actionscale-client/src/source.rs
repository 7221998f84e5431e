//! Upstream data-source seam.

use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha224};

use actionscale_core::{JobRecord, WorkflowConfig, WorkflowInfoMap};

use crate::error::SourceResult;

/// Characters of a token left visible at each end when redacted.
const TOKEN_SIDE_CHARS_REVEALED: usize = 3;

/// Remaining API budget of one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenCredits {
    /// Hex SHA-224 of the token.
    pub fingerprint: String,
    /// Token with all but its first and last characters masked.
    pub redacted: String,
    pub remaining: i64,
}

/// Stateless access to one repository's workflow runs.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Runs in an active status, at most one page.
    async fn get_queued_jobs(&self) -> SourceResult<Vec<JobRecord>>;

    async fn get_remaining_credits(&self) -> SourceResult<TokenCredits>;

    /// Workflow definitions with their `runs-on` labels.
    async fn get_workflow_data(&self) -> SourceResult<WorkflowInfoMap>;
}

/// Builds the data source for a workflow config.
pub trait DataSourceFactory: Send + Sync {
    fn for_workflow(&self, config: &WorkflowConfig) -> Arc<dyn DataSource>;
}

/// Fingerprint and redacted display form of a token.
pub fn tokenize_token(token: &str) -> (String, String) {
    let fingerprint = hex::encode(Sha224::digest(token.as_bytes()));
    let len = token.chars().count();
    let redacted = token
        .chars()
        .enumerate()
        .map(|(i, c)| {
            if i < TOKEN_SIDE_CHARS_REVEALED || i + TOKEN_SIDE_CHARS_REVEALED >= len {
                c
            } else {
                '*'
            }
        })
        .collect();
    (fingerprint, redacted)
}
