//! Persisted per-workflow client state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use actionscale_core::JobRecord;

use crate::error::{StateError, StateResult};

/// Outcome of the last refresh of a workflow's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Status {
    /// Never refreshed.
    #[default]
    Unset,
    /// Last refresh succeeded.
    Valid,
    /// Last refresh failed; the previous snapshot is kept.
    Errored,
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        match status {
            Status::Unset => 0,
            Status::Valid => 1,
            Status::Errored => 2,
        }
    }
}

impl TryFrom<u8> for Status {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Status::Unset),
            1 => Ok(Status::Valid),
            2 => Ok(Status::Errored),
            other => Err(format!("unknown status {other}")),
        }
    }
}

/// Cached queue snapshot for one workflow, keyed by workflow name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientState {
    pub name: String,
    #[serde(default)]
    pub last_value: Vec<JobRecord>,
    /// Unix epoch when never refreshed.
    #[serde(default = "epoch")]
    pub last_request: DateTime<Utc>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub next_forced_scale: Option<DateTime<Utc>>,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl ClientState {
    /// Fresh state for a workflow that has never been refreshed.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_value: Vec::new(),
            last_request: epoch(),
            status: Status::Unset,
            next_forced_scale: None,
        }
    }

    pub fn to_json(&self) -> StateResult<String> {
        serde_json::to_string(self).map_err(|e| StateError::Serialize(e.to_string()))
    }

    pub fn from_json(raw: &str) -> StateResult<Self> {
        serde_json::from_str(raw).map_err(|e| StateError::Deserialize(e.to_string()))
    }
}
