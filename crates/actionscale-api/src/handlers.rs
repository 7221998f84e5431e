//! REST API handlers.
//!
//! Metric lookups go through the [`Host`](actionscale_host::Host); every
//! response except `/metrics` is JSON.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::{debug, error, warn};

use actionscale_labels::Selector;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

// ── Metrics API ────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct NamespaceQuery {
    pub namespace: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SelectorQuery {
    #[serde(default)]
    pub selector: String,
}

/// GET /apis/v1/metrics
pub async fn list_metrics(
    State(state): State<ApiState>,
    Query(query): Query<NamespaceQuery>,
) -> impl IntoResponse {
    let names = state.host.get_all_metric_names(query.namespace.as_deref());
    ApiResponse::ok(names)
}

/// GET /apis/v1/namespaces/{namespace}/metrics/{name}
pub async fn get_metric(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
    Query(query): Query<SelectorQuery>,
) -> impl IntoResponse {
    let selector = match Selector::parse(&query.selector) {
        Ok(s) => s,
        Err(e) => return error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response(),
    };

    match state.host.workflow(&name) {
        Some(wf) if wf.namespace == namespace => {}
        _ => {
            debug!(%namespace, %name, "metric not served in namespace");
            return error_response("metric not found", StatusCode::NOT_FOUND).into_response();
        }
    }

    match state.host.serve_metric(&name, &selector).await {
        Ok(metric) => ApiResponse::ok(metric).into_response(),
        Err(e) if e.is_not_found() => {
            error_response("metric not found", StatusCode::NOT_FOUND).into_response()
        }
        Err(e) => {
            error!(%namespace, %name, %selector, error = %e, "failed to serve metric");
            error_response("failed to query metric", StatusCode::INTERNAL_SERVER_ERROR)
                .into_response()
        }
    }
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let body = actionscale_metrics::render_prometheus(&state.recorder);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

// ── Health ─────────────────────────────────────────────────────

/// GET /livez
pub async fn livez() -> impl IntoResponse {
    ApiResponse::ok("ok")
}

/// GET /readyz
pub async fn readyz(State(state): State<ApiState>) -> impl IntoResponse {
    match state.host.state().ping().await {
        Ok(()) => ApiResponse::ok("ready").into_response(),
        Err(e) => {
            warn!(error = %e, "readiness check failed");
            error_response(&e.to_string(), StatusCode::SERVICE_UNAVAILABLE).into_response()
        }
    }
}
