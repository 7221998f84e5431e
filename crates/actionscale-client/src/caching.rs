//! CachingClient — serves a workflow's queue from the shared cache and
//! refreshes it from the data source when stale.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use actionscale_core::scaling::add_duration;
use actionscale_core::{
    Clock, ForcedScale, JobRecord, ScalingPolicy, SystemClock, WorkflowConfig, WorkflowInfoMap,
};
use actionscale_metrics::{MetricsRecorder, NoopRecorder};
use actionscale_state::{StateProvider, Status};

use crate::error::{ClientError, ClientResult, SourceError, SourceResult};
use crate::flight::FlightGroup;
use crate::source::DataSource;

/// Freshness settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheWindows {
    /// Lifetime of a non-empty snapshot.
    pub window: Duration,
    /// Lifetime of an empty snapshot.
    pub when_empty: Duration,
    /// Upper bound on one data-source call.
    pub fetch_timeout: Duration,
}

impl Default for CacheWindows {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            when_empty: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// Queue snapshot handed back to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedJobs {
    pub jobs: Vec<JobRecord>,
    /// When the snapshot was fetched from the data source.
    pub last_refreshed_at: DateTime<Utc>,
    pub cache_hit: bool,
}

/// Cache-aware client for one workflow.
pub struct CachingClient {
    name: String,
    repo_key: String,
    source: Arc<dyn DataSource>,
    state: Arc<dyn StateProvider>,
    recorder: Arc<dyn MetricsRecorder>,
    clock: Arc<dyn Clock>,
    flights: FlightGroup,
    windows: CacheWindows,
}

impl CachingClient {
    pub fn new(
        config: &WorkflowConfig,
        source: Arc<dyn DataSource>,
        state: Arc<dyn StateProvider>,
        windows: CacheWindows,
    ) -> Self {
        Self {
            name: config.name.clone(),
            repo_key: config.repo_key(),
            source,
            state,
            recorder: Arc::new(NoopRecorder),
            clock: Arc::new(SystemClock),
            flights: FlightGroup::disabled(),
            windows,
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn MetricsRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_flights(mut self, flights: FlightGroup) -> Self {
        self.flights = flights;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current queue, from cache when fresh.
    pub async fn get_queued_jobs(&self) -> ClientResult<QueuedJobs> {
        let result = self.refresh().await;
        match &result {
            Ok(queued) => {
                self.recorder
                    .record_queue_length(&self.name, queued.cache_hit, false, queued.jobs.len());
                self.recorder.record_query(&self.name, queued.cache_hit, false);
            }
            Err(_) => {
                self.recorder.record_queue_length(&self.name, false, true, 0);
                self.recorder.record_query(&self.name, false, true);
            }
        }
        result
    }

    async fn refresh(&self) -> ClientResult<QueuedJobs> {
        let _flight = self.flights.acquire(&self.name).await;

        let mut state = self.state.get_state(&self.name).await?;
        let window = if state.last_value.is_empty() {
            self.windows.when_empty
        } else {
            self.windows.window
        };
        let cache_until = add_duration(state.last_request, window);
        let now = self.clock.now();

        if state.status == Status::Valid && now <= cache_until {
            debug!(
                workflow = %self.name,
                jobs = state.last_value.len(),
                %cache_until,
                "cache hit"
            );
            return Ok(QueuedJobs {
                jobs: state.last_value,
                last_refreshed_at: state.last_request,
                cache_hit: true,
            });
        }

        debug!(
            workflow = %self.name,
            status = ?state.status,
            %cache_until,
            %now,
            "cache miss"
        );

        let fetched = self.bounded(self.source.get_queued_jobs()).await;
        self.sample_credits().await;

        let fetch_err = match fetched {
            Ok(jobs) => {
                state.last_request = self.clock.now();
                state.last_value = jobs;
                state.status = Status::Valid;
                None
            }
            Err(e) => {
                warn!(workflow = %self.name, error = %e, "failed to fetch queued jobs");
                state.status = Status::Errored;
                Some(e)
            }
        };

        let saved = self.state.set_state(&self.name, &state).await;
        match (fetch_err, saved) {
            (None, Ok(())) => Ok(QueuedJobs {
                jobs: state.last_value,
                last_refreshed_at: state.last_request,
                cache_hit: false,
            }),
            (None, Err(persist)) => Err(ClientError::State(persist)),
            (Some(fetch), Ok(())) => Err(ClientError::Fetch {
                name: self.name.clone(),
                source: fetch,
            }),
            (Some(fetch), Err(persist)) => Err(ClientError::FetchAndPersist { fetch, persist }),
        }
    }

    /// Report the token's remaining credits. Failures are only logged.
    async fn sample_credits(&self) {
        match self.bounded(self.source.get_remaining_credits()).await {
            Ok(credits) => {
                self.recorder.record_credits(
                    &credits.fingerprint,
                    &credits.redacted,
                    credits.remaining,
                );
            }
            Err(e) => {
                warn!(workflow = %self.name, error = %e, "failed to read remaining credits");
            }
        }
    }

    /// Workflow definitions of the repository, from cache when present.
    pub async fn get_workflow_info(&self) -> ClientResult<WorkflowInfoMap> {
        let _flight = self.flights.acquire(&format!("info:{}", self.repo_key)).await;

        if let Some(info) = self.state.get_workflow_info(&self.repo_key).await? {
            return Ok(info);
        }

        let info = self
            .bounded(self.source.get_workflow_data())
            .await
            .map_err(|source| ClientError::Fetch {
                name: self.repo_key.clone(),
                source,
            })?;
        self.state.set_workflow_info(&self.repo_key, &info).await?;
        debug!(repo = %self.repo_key, workflows = info.len(), "workflow info cached");
        Ok(info)
    }

    /// Advance the forced scale-up schedule and persist it when it moved.
    pub async fn update_forced_scale(&self, policy: &ScalingPolicy) -> ClientResult<ForcedScale> {
        let _flight = self.flights.acquire(&self.name).await;

        let mut state = self.state.get_state(&self.name).await?;
        let decision = policy.calculate_forced_scale_at(
            self.clock.now(),
            state.next_forced_scale,
            &mut rand::rng(),
        );
        if decision.next != state.next_forced_scale {
            debug!(
                workflow = %self.name,
                next = ?decision.next,
                "forced scale-up rescheduled"
            );
            state.next_forced_scale = decision.next;
            self.state.set_state(&self.name, &state).await?;
        }
        Ok(decision)
    }

    async fn bounded<T>(&self, fut: impl Future<Output = SourceResult<T>>) -> SourceResult<T> {
        let limit = self.windows.fetch_timeout;
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| SourceError::Timeout(limit))?
    }
}
