//! Recorder trait implemented by metric backends.

use std::fmt;

/// One served metric value, reported after the scaling function ran.
#[derive(Debug, Clone, PartialEq)]
pub struct ServedSample {
    /// Workflow name.
    pub name: String,
    /// Canonical selector string the caller asked for.
    pub selector: String,
    /// Comma-joined matched values of `wf_id`, `wf_name`, `wf_runs_on`.
    pub job_labels: [String; 3],
    /// Filtered queue length before scaling.
    pub raw: usize,
    /// Value handed to the autoscaler.
    pub scaled: u32,
    /// `scaled` was pinned to the maximum by a forced scale-up.
    pub forced: bool,
}

/// Sink for pipeline measurements.
pub trait MetricsRecorder: Send + Sync + fmt::Debug {
    /// Unfiltered queue length returned by one client call.
    fn record_queue_length(&self, name: &str, cache_hit: bool, failed: bool, length: usize);

    /// One client query, hit or miss.
    fn record_query(&self, name: &str, cache_hit: bool, failed: bool);

    /// Remaining API credits of a token, keyed by its fingerprint.
    fn record_credits(&self, fingerprint: &str, redacted: &str, remaining: i64);

    /// Filtered and scaled values served for one metric query.
    fn record_served(&self, sample: &ServedSample);
}

/// Recorder that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl MetricsRecorder for NoopRecorder {
    fn record_queue_length(&self, _name: &str, _cache_hit: bool, _failed: bool, _length: usize) {}
    fn record_query(&self, _name: &str, _cache_hit: bool, _failed: bool) {}
    fn record_credits(&self, _fingerprint: &str, _redacted: &str, _remaining: i64) {}
    fn record_served(&self, _sample: &ServedSample) {}
}
