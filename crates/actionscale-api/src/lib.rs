//! actionscale-api — HTTP surface for the queue metrics.
//!
//! Serves the filtered, scaled queue length per workflow in the shape an
//! external-metrics autoscaler polls, plus process health and the
//! Prometheus exposition.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/apis/v1/metrics?namespace=` | List metric (workflow) names |
//! | GET | `/apis/v1/namespaces/{ns}/metrics/{name}?selector=` | Served metric |
//! | GET | `/metrics` | Prometheus exposition |
//! | GET | `/livez` | Liveness |
//! | GET | `/readyz` | Readiness (state backend reachable) |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use actionscale_host::Host;
use actionscale_metrics::PrometheusRecorder;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub host: Host,
    pub recorder: Arc<PrometheusRecorder>,
}

/// Build the complete router.
pub fn build_router(host: Host, recorder: Arc<PrometheusRecorder>) -> Router {
    let state = ApiState { host, recorder };

    let api_routes = Router::new()
        .route("/metrics", get(handlers::list_metrics))
        .route(
            "/namespaces/{namespace}/metrics/{name}",
            get(handlers::get_metric),
        )
        .with_state(state.clone());

    Router::new()
        .nest("/apis/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .with_state(state)
}
