//! Host — resolves a metric name to a workflow and answers queries.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use actionscale_client::{CacheWindows, CachingClient, DataSourceFactory, FlightGroup};
use actionscale_core::{Clock, WorkflowConfig};
use actionscale_labels::{MatchedLabels, Selector, filter_by_selector, labels_for_output};
use actionscale_metrics::{MetricsRecorder, ServedSample};
use actionscale_state::StateProvider;

use crate::error::{HostError, HostResult};
use crate::workflows::WorkflowSource;

/// Collaborators of a [`Host`].
pub struct HostDeps {
    pub workflows: Arc<dyn WorkflowSource>,
    pub state: Arc<dyn StateProvider>,
    pub sources: Arc<dyn DataSourceFactory>,
    pub recorder: Arc<dyn MetricsRecorder>,
    pub clock: Arc<dyn Clock>,
}

/// Filtered queue length for one workflow and selector.
#[derive(Debug, Clone)]
pub struct MetricQuery {
    pub count: usize,
    pub retrieved_at: DateTime<Utc>,
    pub labels: MatchedLabels,
    pub workflow: WorkflowConfig,
    pub forced_scale: bool,
}

/// Value handed to the autoscaler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServedMetric {
    pub name: String,
    pub namespace: String,
    pub selector: String,
    /// Filtered queue length.
    pub raw: usize,
    /// Desired runner count.
    pub scaled: u32,
    pub forced_scale: bool,
    pub retrieved_at: DateTime<Utc>,
    /// `wf_id`, `wf_name`, `wf_runs_on` values of the matched runs.
    pub job_labels: [String; 3],
    pub labels: BTreeMap<String, String>,
}

/// Query orchestrator. Cheap to clone.
#[derive(Clone)]
pub struct Host {
    workflows: Arc<dyn WorkflowSource>,
    state: Arc<dyn StateProvider>,
    sources: Arc<dyn DataSourceFactory>,
    recorder: Arc<dyn MetricsRecorder>,
    clock: Arc<dyn Clock>,
    flights: FlightGroup,
    windows: CacheWindows,
}

impl Host {
    pub fn new(deps: HostDeps, windows: CacheWindows) -> Self {
        Self {
            workflows: deps.workflows,
            state: deps.state,
            sources: deps.sources,
            recorder: deps.recorder,
            clock: deps.clock,
            flights: FlightGroup::new(),
            windows,
        }
    }

    /// Coalesce concurrent refreshes of one workflow (on by default).
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.flights = if enabled {
            FlightGroup::new()
        } else {
            FlightGroup::disabled()
        };
        self
    }

    pub fn state(&self) -> &Arc<dyn StateProvider> {
        &self.state
    }

    pub fn workflow(&self, name: &str) -> Option<WorkflowConfig> {
        self.workflows.get(name)
    }

    fn client_for(&self, workflow: &WorkflowConfig) -> CachingClient {
        CachingClient::new(
            workflow,
            self.sources.for_workflow(workflow),
            self.state.clone(),
            self.windows,
        )
        .with_recorder(self.recorder.clone())
        .with_clock(self.clock.clone())
        .with_flights(self.flights.clone())
    }

    /// Names of all workflows, optionally limited to one namespace.
    pub fn get_all_metric_names(&self, namespace: Option<&str>) -> Vec<String> {
        self.workflows
            .all()
            .into_iter()
            .filter(|wf| namespace.is_none_or(|ns| wf.namespace == ns))
            .map(|wf| wf.name)
            .collect()
    }

    /// Count the queued runs of `key` that match `selector`.
    pub async fn query_metric(&self, key: &str, selector: &Selector) -> HostResult<MetricQuery> {
        let workflow = self
            .workflows
            .get(key)
            .ok_or_else(|| HostError::MetricNotFound(key.to_string()))?;
        let client = self.client_for(&workflow);

        let queued = client.get_queued_jobs().await?;
        let info = client.get_workflow_info().await?;
        let forced = client.update_forced_scale(&workflow.scaling).await?;

        let (matched, labels) = filter_by_selector(&queued.jobs, &workflow, &info, selector);
        debug!(
            workflow = %workflow.name,
            selector = %selector,
            queued = queued.jobs.len(),
            matched = matched.len(),
            cache_hit = queued.cache_hit,
            forced = forced.active,
            "metric queried"
        );

        Ok(MetricQuery {
            count: matched.len(),
            retrieved_at: queued.last_refreshed_at,
            labels,
            workflow,
            forced_scale: forced.active,
        })
    }

    /// Query, then scale. A forced scale-up pins the value to the maximum.
    pub async fn serve_metric(&self, key: &str, selector: &Selector) -> HostResult<ServedMetric> {
        let query = self.query_metric(key, selector).await?;
        let policy = &query.workflow.scaling;
        let scaled = if query.forced_scale {
            policy.max_workers()
        } else {
            policy.output(u32::try_from(query.count).unwrap_or(u32::MAX))
        };

        let (job_labels, labels) = labels_for_output(&query.labels);
        let selector = selector.to_string();
        self.recorder.record_served(&ServedSample {
            name: query.workflow.name.clone(),
            selector: selector.clone(),
            job_labels: job_labels.clone(),
            raw: query.count,
            scaled,
            forced: query.forced_scale,
        });

        Ok(ServedMetric {
            name: query.workflow.name,
            namespace: query.workflow.namespace,
            selector,
            raw: query.count,
            scaled,
            forced_scale: query.forced_scale,
            retrieved_at: query.retrieved_at,
            job_labels,
            labels,
        })
    }

    /// Refresh every workflow once, concurrently. Returns how many
    /// succeeded, or every failure joined into one error.
    pub async fn warm_up(&self) -> HostResult<usize> {
        let mut tasks = JoinSet::new();
        for workflow in self.workflows.all() {
            let client = self.client_for(&workflow);
            let title = workflow.title();
            tasks.spawn(async move {
                info!(client = %title, "initializing client");
                let result = client.get_queued_jobs().await;
                (title, result)
            });
        }

        let mut ok = 0;
        let mut errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((title, Ok(queued))) => {
                    info!(client = %title, queued = queued.jobs.len(), "client initialized");
                    ok += 1;
                }
                Ok((title, Err(e))) => {
                    errors.push(format!("Error loading queue for client '{title}': {e}"));
                }
                Err(e) => errors.push(format!("warm-up task failed: {e}")),
            }
        }

        if errors.is_empty() {
            Ok(ok)
        } else {
            errors.sort();
            warn!(failed = errors.len(), succeeded = ok, "warm-up finished with errors");
            Err(HostError::WarmUp(errors.join("\n")))
        }
    }
}
