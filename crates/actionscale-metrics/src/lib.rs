//! actionscale-metrics — instrumentation for the queue pipeline.
//!
//! The pipeline reports through an injected [`MetricsRecorder`] rather than
//! a process-global registry, so tests can assert on what was recorded.
//!
//! # Architecture
//!
//! ```text
//! CachingClient ──► record_queue_length / record_query / record_credits
//! Host          ──► record_served
//!                       │
//!                       ▼
//!               PrometheusRecorder (label-keyed series)
//!                       │
//!                       ▼
//!               render_prometheus() → text/plain for /metrics
//! ```

pub mod prometheus;
pub mod recorder;
pub mod registry;

pub use prometheus::render_prometheus;
pub use recorder::{MetricsRecorder, NoopRecorder, ServedSample};
pub use registry::PrometheusRecorder;
