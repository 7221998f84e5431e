//! actionscale-host — answers metric queries for configured workflows.
//!
//! # Architecture
//!
//! ```text
//! query_metric(name, selector)
//!   ├── WorkflowSource.get(name)          → MetricNotFound when absent
//!   ├── CachingClient.get_queued_jobs()   → cached or fresh queue
//!   ├── CachingClient.get_workflow_info() → runs-on labels per workflow
//!   ├── CachingClient.update_forced_scale()
//!   └── filter_by_selector()              → count + matched labels
//!
//! serve_metric = query_metric + ScalingPolicy.output (max when forced)
//!
//! run_resync(interval) ── FileWorkflowLoader ──► WorkflowStore
//! ```

pub mod error;
pub mod host;
pub mod workflows;

pub use error::{HostError, HostResult};
pub use host::{Host, HostDeps, MetricQuery, ServedMetric};
pub use workflows::{
    FileWorkflowLoader, LoadOutcome, ResyncReport, WorkflowLoader, WorkflowSource, WorkflowStore,
    resync, run_resync,
};
