//! In-process Prometheus registry.
//!
//! Each metric family keeps its series in a `BTreeMap` keyed by label
//! values, so rendering is deterministic.

use std::collections::BTreeMap;
use std::sync::RwLock;

use tracing::trace;

use crate::recorder::{MetricsRecorder, ServedSample};

pub const QUEUE_LENGTH: &str = "workflow_queue_length";
pub const QUEUE_QUERIES: &str = "workflow_queue_queries";
pub const TOKEN_CREDITS: &str = "github_token_remaining_credits";
pub const QUEUE_LENGTH_FILTERED: &str = "workflow_queue_length_filtered";
pub const QUEUE_LENGTH_FILTERED_SCALED: &str = "workflow_queue_length_filtered_scaled";

const CLIENT_LABELS: &[&str] = &["name", "cache_hit", "failed"];
const TOKEN_LABELS: &[&str] = &["token", "redacted"];
const FILTERED_LABELS: &[&str] = &["name", "selector", "wf_id", "wf_name", "wf_runs_on"];
const SCALED_LABELS: &[&str] = &["name", "selector", "wf_id", "wf_name", "wf_runs_on", "forced"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

/// One named metric and all its labelled series.
#[derive(Debug, Clone)]
pub struct Family {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    pub label_names: &'static [&'static str],
    pub series: BTreeMap<Vec<String>, f64>,
}

impl Family {
    fn new(
        name: &'static str,
        help: &'static str,
        kind: MetricKind,
        label_names: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            help,
            kind,
            label_names,
            series: BTreeMap::new(),
        }
    }
}

/// [`MetricsRecorder`] that accumulates Prometheus series in memory.
#[derive(Debug)]
pub struct PrometheusRecorder {
    families: RwLock<Vec<Family>>,
}

impl Default for PrometheusRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusRecorder {
    pub fn new() -> Self {
        let families = vec![
            Family::new(
                QUEUE_LENGTH,
                "Number of queued workflow runs returned by the client.",
                MetricKind::Gauge,
                CLIENT_LABELS,
            ),
            Family::new(
                QUEUE_QUERIES,
                "Number of queue queries, split by cache hit and failure.",
                MetricKind::Counter,
                CLIENT_LABELS,
            ),
            Family::new(
                TOKEN_CREDITS,
                "Remaining GitHub API credits per token.",
                MetricKind::Gauge,
                TOKEN_LABELS,
            ),
            Family::new(
                QUEUE_LENGTH_FILTERED,
                "Queued workflow runs matching a selector.",
                MetricKind::Gauge,
                FILTERED_LABELS,
            ),
            Family::new(
                QUEUE_LENGTH_FILTERED_SCALED,
                "Scaled runner count served for a selector.",
                MetricKind::Gauge,
                SCALED_LABELS,
            ),
        ];
        Self {
            families: RwLock::new(families),
        }
    }

    /// Copy of every family, for rendering.
    pub fn snapshot(&self) -> Vec<Family> {
        self.families
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Current value of one series, if present.
    pub fn value(&self, name: &str, labels: &[&str]) -> Option<f64> {
        let key: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        let families = self
            .families
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        families
            .iter()
            .find(|f| f.name == name)
            .and_then(|f| f.series.get(&key).copied())
    }

    fn update(&self, name: &str, labels: Vec<String>, apply: impl FnOnce(&mut f64)) {
        let mut families = self
            .families
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(family) = families.iter_mut().find(|f| f.name == name) {
            debug_assert_eq!(family.label_names.len(), labels.len());
            apply(family.series.entry(labels).or_insert(0.0));
        }
    }

    fn set(&self, name: &str, labels: Vec<String>, value: f64) {
        self.update(name, labels, |v| *v = value);
    }

    fn inc(&self, name: &str, labels: Vec<String>) {
        self.update(name, labels, |v| *v += 1.0);
    }
}

fn client_labels(name: &str, cache_hit: bool, failed: bool) -> Vec<String> {
    vec![name.to_string(), cache_hit.to_string(), failed.to_string()]
}

impl MetricsRecorder for PrometheusRecorder {
    fn record_queue_length(&self, name: &str, cache_hit: bool, failed: bool, length: usize) {
        self.set(QUEUE_LENGTH, client_labels(name, cache_hit, failed), length as f64);
    }

    fn record_query(&self, name: &str, cache_hit: bool, failed: bool) {
        self.inc(QUEUE_QUERIES, client_labels(name, cache_hit, failed));
    }

    fn record_credits(&self, fingerprint: &str, redacted: &str, remaining: i64) {
        self.set(
            TOKEN_CREDITS,
            vec![fingerprint.to_string(), redacted.to_string()],
            remaining as f64,
        );
    }

    fn record_served(&self, sample: &ServedSample) {
        let [wf_id, wf_name, wf_runs_on] = &sample.job_labels;
        let mut labels = vec![
            sample.name.clone(),
            sample.selector.clone(),
            wf_id.clone(),
            wf_name.clone(),
            wf_runs_on.clone(),
        ];
        self.set(QUEUE_LENGTH_FILTERED, labels.clone(), sample.raw as f64);

        labels.push(sample.forced.to_string());
        self.set(QUEUE_LENGTH_FILTERED_SCALED, labels, f64::from(sample.scaled));
        trace!(
            name = %sample.name,
            raw = sample.raw,
            scaled = sample.scaled,
            forced = sample.forced,
            "served sample recorded"
        );
    }
}
