//! GitHub REST data source.
//!
//! Three calls are made against the API:
//!
//! ```text
//! GET /repos/{owner}/{repo}/actions/runs?per_page=100   queued runs (first page)
//! GET /rate_limit                                       remaining core credits
//! GET /repos/{owner}/{repo}/actions/workflows           workflow definitions,
//!     then GET /repos/{owner}/{repo}/contents/{path}    each file, for runs-on
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use actionscale_core::{JobRecord, WorkflowConfig, WorkflowInfo, WorkflowInfoMap, is_active_status};

use crate::error::{SourceError, SourceResult};
use crate::source::{DataSource, DataSourceFactory, TokenCredits, tokenize_token};

const USER_AGENT_VALUE: &str = concat!("actionscale/", env!("CARGO_PKG_VERSION"));
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";

// ── Response shapes ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RunsPage {
    #[serde(default)]
    workflow_runs: Vec<Run>,
}

#[derive(Debug, Deserialize)]
struct Run {
    id: i64,
    workflow_id: i64,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RateLimits {
    resources: RateResources,
}

#[derive(Debug, Deserialize)]
struct RateResources {
    core: RateBucket,
}

#[derive(Debug, Deserialize)]
struct RateBucket {
    remaining: i64,
}

#[derive(Debug, Deserialize)]
struct WorkflowsPage {
    #[serde(default)]
    workflows: Vec<Workflow>,
}

#[derive(Debug, Deserialize)]
struct Workflow {
    id: i64,
    name: String,
    path: String,
}

// ── Data source ───────────────────────────────────────────────────

/// [`DataSource`] for one repository.
#[derive(Clone)]
pub struct GitHubDataSource {
    http: reqwest::Client,
    api_url: String,
    owner: String,
    repository: String,
    token: String,
}

impl std::fmt::Debug for GitHubDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubDataSource")
            .field("api_url", &self.api_url)
            .field("owner", &self.owner)
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}

impl GitHubDataSource {
    pub fn new(
        http: reqwest::Client,
        api_url: impl Into<String>,
        owner: impl Into<String>,
        repository: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            owner: owner.into(),
            repository: repository.into(),
            token: token.into(),
        }
    }

    fn repo_url(&self, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}/{suffix}",
            self.api_url, self.owner, self.repository
        )
    }

    fn headers(&self, accept: &'static str) -> SourceResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        if !self.token.is_empty() {
            let mut auth = HeaderValue::from_str(&format!("Bearer {}", self.token))
                .map_err(|e| SourceError::Http(format!("invalid token header: {e}")))?;
            auth.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth);
        }
        Ok(headers)
    }

    async fn send(&self, url: &str, accept: &'static str) -> SourceResult<reqwest::Response> {
        let response = self
            .http
            .get(url)
            .headers(self.headers(accept)?)
            .send()
            .await
            .map_err(|e| SourceError::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> SourceResult<T> {
        self.send(url, JSON_MEDIA_TYPE)
            .await?
            .json::<T>()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))
    }

    async fn runs_on_labels(&self, path: &str) -> SourceResult<Vec<String>> {
        let url = self.repo_url(&format!("contents/{path}"));
        let body = self
            .send(&url, RAW_MEDIA_TYPE)
            .await?
            .text()
            .await
            .map_err(|e| SourceError::Http(e.to_string()))?;
        parse_runs_on(&body)
    }
}

#[async_trait]
impl DataSource for GitHubDataSource {
    async fn get_queued_jobs(&self) -> SourceResult<Vec<JobRecord>> {
        let page: RunsPage = self.get_json(&self.repo_url("actions/runs?per_page=100")).await?;
        let total = page.workflow_runs.len();
        let jobs = active_jobs(page.workflow_runs);
        debug!(
            owner = %self.owner,
            repository = %self.repository,
            total,
            active = jobs.len(),
            "fetched workflow runs"
        );
        Ok(jobs)
    }

    async fn get_remaining_credits(&self) -> SourceResult<TokenCredits> {
        let (fingerprint, redacted) = tokenize_token(&self.token);
        let limits: RateLimits = self
            .get_json(&format!("{}/rate_limit", self.api_url))
            .await?;
        Ok(TokenCredits {
            fingerprint,
            redacted,
            remaining: limits.resources.core.remaining,
        })
    }

    async fn get_workflow_data(&self) -> SourceResult<WorkflowInfoMap> {
        let page: WorkflowsPage = self.get_json(&self.repo_url("actions/workflows")).await?;
        let mut results = WorkflowInfoMap::new();
        for wf in page.workflows {
            let labels = match self.runs_on_labels(&wf.path).await {
                Ok(labels) => labels,
                Err(e) => {
                    warn!(
                        path = %wf.path,
                        owner = %self.owner,
                        repository = %self.repository,
                        error = %e,
                        "failed to get workflow info"
                    );
                    Vec::new()
                }
            };
            results.insert(
                wf.id,
                WorkflowInfo {
                    id: wf.id,
                    name: wf.name,
                    labels,
                },
            );
        }
        Ok(results)
    }
}

fn active_jobs(runs: Vec<Run>) -> Vec<JobRecord> {
    runs.into_iter()
        .filter_map(|run| {
            let status = run.status?;
            is_active_status(&status).then(|| JobRecord::new(run.id, run.workflow_id, status))
        })
        .collect()
}

/// Union of every job's `runs-on` labels in a workflow file, sorted and
/// deduplicated. Accepts the string, list and `{ labels: ... }` forms.
pub fn parse_runs_on(yaml: &str) -> SourceResult<Vec<String>> {
    let doc: serde_yaml::Value =
        serde_yaml::from_str(yaml).map_err(|e| SourceError::Decode(e.to_string()))?;
    let mut labels = BTreeSet::new();

    if let Some(jobs) = doc.get("jobs").and_then(|j| j.as_mapping()) {
        for job in jobs.values() {
            if let Some(runs_on) = job.get("runs-on") {
                collect_labels(runs_on, &mut labels);
            }
        }
    }
    Ok(labels.into_iter().collect())
}

fn collect_labels(value: &serde_yaml::Value, out: &mut BTreeSet<String>) {
    match value {
        serde_yaml::Value::String(s) => {
            out.insert(s.clone());
        }
        serde_yaml::Value::Sequence(items) => {
            for item in items {
                if let Some(s) = item.as_str() {
                    out.insert(s.to_string());
                }
            }
        }
        serde_yaml::Value::Mapping(map) => {
            if let Some(inner) = map.get("labels") {
                collect_labels(inner, out);
            }
        }
        _ => {}
    }
}

// ── Factory ───────────────────────────────────────────────────────

/// Builds a [`GitHubDataSource`] per workflow, sharing one HTTP client.
#[derive(Debug, Clone)]
pub struct GitHubSourceFactory {
    http: reqwest::Client,
    api_url: String,
}

impl GitHubSourceFactory {
    pub fn new(api_url: impl Into<String>) -> SourceResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| SourceError::Http(e.to_string()))?;
        Ok(Self {
            http,
            api_url: api_url.into(),
        })
    }
}

impl DataSourceFactory for GitHubSourceFactory {
    fn for_workflow(&self, config: &WorkflowConfig) -> Arc<dyn DataSource> {
        Arc::new(GitHubDataSource::new(
            self.http.clone(),
            self.api_url.clone(),
            config.owner.clone(),
            config.repository.clone(),
            config.token.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::{HeaderMap as AxumHeaders, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    const BUILD_YML: &str = r#"
name: build
on: push
jobs:
  lint:
    runs-on: ubuntu-latest
    steps: []
  test:
    runs-on: [self-hosted, linux, ubuntu-latest]
  gpu:
    runs-on:
      group: big
      labels: gpu
"#;

    async fn spawn_fake_github() -> String {
        let app = Router::new()
            .route(
                "/repos/{owner}/{repo}/actions/runs",
                get(|headers: AxumHeaders| async move {
                    if headers.get("authorization").and_then(|v| v.to_str().ok())
                        != Some("Bearer t0ken-value")
                    {
                        return Err(StatusCode::UNAUTHORIZED);
                    }
                    Ok(Json(json!({
                        "total_count": 4,
                        "workflow_runs": [
                            {"id": 1, "workflow_id": 10, "status": "queued"},
                            {"id": 2, "workflow_id": 10, "status": "completed"},
                            {"id": 3, "workflow_id": 11, "status": "in_progress"},
                            {"id": 4, "workflow_id": 11, "status": null}
                        ]
                    })))
                }),
            )
            .route(
                "/rate_limit",
                get(|| async { Json(json!({"resources": {"core": {"remaining": 4321}}})) }),
            )
            .route(
                "/repos/{owner}/{repo}/actions/workflows",
                get(|| async {
                    Json(json!({
                        "total_count": 2,
                        "workflows": [
                            {"id": 10, "name": "build", "path": ".github/workflows/build.yml"},
                            {"id": 11, "name": "broken", "path": ".github/workflows/missing.yml"}
                        ]
                    }))
                }),
            )
            .route(
                "/repos/{owner}/{repo}/contents/{*path}",
                get(|Path((_, _, path)): Path<(String, String, String)>| async move {
                    if path.ends_with("build.yml") {
                        Ok(BUILD_YML.to_string())
                    } else {
                        Err(StatusCode::NOT_FOUND)
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn source(api_url: String) -> GitHubDataSource {
        GitHubDataSource::new(reqwest::Client::new(), api_url, "octo", "hello", "t0ken-value")
    }

    #[test]
    fn parses_runs_on_forms() {
        let labels = parse_runs_on(BUILD_YML).unwrap();
        assert_eq!(labels, vec!["gpu", "linux", "self-hosted", "ubuntu-latest"]);
    }

    #[test]
    fn workflow_without_jobs_has_no_labels() {
        assert!(parse_runs_on("name: empty\n").unwrap().is_empty());
        assert!(parse_runs_on("jobs: [: bad").is_err());
    }

    #[test]
    fn keeps_only_active_runs() {
        let runs = vec![
            Run { id: 1, workflow_id: 1, status: Some("queued".to_string()) },
            Run { id: 2, workflow_id: 1, status: Some("completed".to_string()) },
            Run { id: 3, workflow_id: 1, status: Some("waiting".to_string()) },
            Run { id: 4, workflow_id: 1, status: None },
        ];
        let ids: Vec<i64> = active_jobs(runs).iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn debug_hides_token() {
        let rendered = format!("{:?}", source("http://x".to_string()));
        assert!(!rendered.contains("t0ken-value"));
    }

    #[tokio::test]
    async fn fetches_queued_jobs() {
        let jobs = source(spawn_fake_github().await).get_queued_jobs().await.unwrap();
        assert_eq!(
            jobs,
            vec![
                JobRecord::new(1, 10, "queued"),
                JobRecord::new(3, 11, "in_progress")
            ]
        );
    }

    #[tokio::test]
    async fn fetches_remaining_credits() {
        let credits = source(spawn_fake_github().await)
            .get_remaining_credits()
            .await
            .unwrap();
        assert_eq!(credits.remaining, 4321);
        assert_eq!(credits.redacted, "t0k*****lue");
    }

    #[tokio::test]
    async fn workflow_data_keeps_unreadable_workflows() {
        let info = source(spawn_fake_github().await)
            .get_workflow_data()
            .await
            .unwrap();
        assert_eq!(info.len(), 2);
        assert_eq!(info[&10].name, "build");
        assert_eq!(info[&10].labels.len(), 4);
        assert_eq!(info[&11].name, "broken");
        assert!(info[&11].labels.is_empty());
    }

    #[tokio::test]
    async fn bad_token_is_a_status_error() {
        let api = spawn_fake_github().await;
        let src = GitHubDataSource::new(reqwest::Client::new(), api, "octo", "hello", "nope");
        let err = src.get_queued_jobs().await.unwrap_err();
        assert!(matches!(err, SourceError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn factory_builds_per_workflow_sources() {
        let factory = GitHubSourceFactory::new(spawn_fake_github().await).unwrap();
        let config = WorkflowConfig {
            name: "wf".to_string(),
            namespace: "ns".to_string(),
            token: "t0ken-value".to_string(),
            owner: "octo".to_string(),
            repository: "hello".to_string(),
            scaling: actionscale_core::ScalingPolicy::new(0, 2, 1.0).unwrap(),
        };
        let jobs = factory.for_workflow(&config).get_queued_jobs().await.unwrap();
        assert_eq!(jobs.len(), 2);
    }
}
