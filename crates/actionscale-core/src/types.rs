//! Domain types shared across the pipeline.
//!
//! `JobRecord` and `WorkflowInfo` are persisted inside cache entries, so
//! their serialized shape is part of the shared-cache layout.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::scaling::ScalingPolicy;

/// Run statuses that count as demand for a runner. Every other status is
/// dropped at the data-source boundary.
pub const ACTIVE_STATUSES: [&str; 4] = ["queued", "waiting", "requested", "in_progress"];

/// Whether a workflow-run status counts towards the queue.
pub fn is_active_status(status: &str) -> bool {
    ACTIVE_STATUSES.contains(&status)
}

// ── Jobs ───────────────────────────────────────────────────────────

/// One queued or running workflow run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobRecord {
    /// Workflow run id.
    pub id: i64,
    /// Id of the workflow definition this run belongs to.
    pub workflow_id: i64,
    pub status: String,
}

impl JobRecord {
    pub fn new(id: i64, workflow_id: i64, status: impl Into<String>) -> Self {
        Self {
            id,
            workflow_id,
            status: status.into(),
        }
    }
}

// ── Workflow definitions ──────────────────────────────────────────

/// Metadata of a workflow definition (one per workflow file, not per run).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct WorkflowInfo {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    /// Sorted, deduplicated `runs-on` labels declared by the workflow's jobs.
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Workflow definitions of one repository, keyed by definition id.
pub type WorkflowInfoMap = BTreeMap<i64, WorkflowInfo>;

// ── Workflow configs ──────────────────────────────────────────────

/// One monitored repository and the scaling policy applied to its queue.
#[derive(Clone, PartialEq)]
pub struct WorkflowConfig {
    /// Cache and metric key. Must stay stable across updates.
    pub name: String,
    pub namespace: String,
    pub token: String,
    pub owner: String,
    pub repository: String,
    pub scaling: ScalingPolicy,
}

impl WorkflowConfig {
    /// Key of the per-repository workflow-info cache entry.
    pub fn repo_key(&self) -> String {
        format!("{}/{}", self.owner, self.repository)
    }

    /// Human-readable identity used in log lines and error messages.
    pub fn title(&self) -> String {
        format!(
            "{}/{} ({} in {})",
            self.owner, self.repository, self.name, self.namespace
        )
    }
}

impl fmt::Debug for WorkflowConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowConfig")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("token", &"<redacted>")
            .field("owner", &self.owner)
            .field("repository", &self.repository)
            .field("scaling", &self.scaling)
            .finish()
    }
}
