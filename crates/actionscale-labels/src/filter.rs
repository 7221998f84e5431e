//! Per-run labels, selector filtering and label aggregation.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use actionscale_core::{JobRecord, WorkflowConfig, WorkflowInfoMap};

use crate::selector::{LabelSet, Selector};

pub const WF_ID_LABEL: &str = "wf_id";
pub const WF_NAME_LABEL: &str = "wf_name";
pub const WF_ALL_RUNS_ON_LABEL: &str = "wf_runs_on";
pub const CR_NAME_LABEL: &str = "cr_name";
pub const CR_NAMESPACE_LABEL: &str = "cr_namespace";
pub const CR_REPO_LABEL: &str = "cr_repo";
pub const CR_OWNER_LABEL: &str = "cr_owner";

/// Labels carried onto the served Prometheus gauges, in output order.
pub const JOB_LABELS_FOR_PROMETHEUS: [&str; 3] = [WF_ID_LABEL, WF_NAME_LABEL, WF_ALL_RUNS_ON_LABEL];

/// Every value seen per label across the matched runs.
pub type MatchedLabels = BTreeMap<String, BTreeSet<String>>;

/// Label key of a single runs-on value.
pub fn runs_on_label(value: &str) -> String {
    format!("{WF_ALL_RUNS_ON_LABEL}_{value}")
}

/// Replace characters outside `[-A-Za-z0-9_.]` with `_`, then trim
/// non-alphanumerics from both ends.
pub fn sanitize_label_value(value: &str) -> String {
    let replaced: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    replaced
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}

/// Label set of one queued run.
pub fn job_labels(job: &JobRecord, config: &WorkflowConfig, info: &WorkflowInfoMap) -> LabelSet {
    let mut labels = LabelSet::new();
    labels.insert(WF_ID_LABEL.to_string(), job.workflow_id.to_string());
    labels.insert(CR_NAME_LABEL.to_string(), sanitize_label_value(&config.name));
    labels.insert(
        CR_NAMESPACE_LABEL.to_string(),
        sanitize_label_value(&config.namespace),
    );
    labels.insert(CR_REPO_LABEL.to_string(), sanitize_label_value(&config.repository));
    labels.insert(CR_OWNER_LABEL.to_string(), sanitize_label_value(&config.owner));

    match info.get(&job.workflow_id) {
        Some(wf) => {
            labels.insert(WF_NAME_LABEL.to_string(), sanitize_label_value(&wf.name));
            let mut runs_on = wf.labels.clone();
            runs_on.sort();
            let all = runs_on
                .iter()
                .map(|l| l.replace('.', "_"))
                .collect::<Vec<_>>()
                .join(".");
            for label in &runs_on {
                labels.insert(runs_on_label(label), label.clone());
            }
            labels.insert(WF_ALL_RUNS_ON_LABEL.to_string(), all);
        }
        None => {
            labels.insert(WF_NAME_LABEL.to_string(), "unknown".to_string());
        }
    }
    labels
}

/// Keep the runs whose labels match `selector`, collecting every label
/// value seen on a kept run.
pub fn filter_by_selector(
    jobs: &[JobRecord],
    config: &WorkflowConfig,
    info: &WorkflowInfoMap,
    selector: &Selector,
) -> (Vec<JobRecord>, MatchedLabels) {
    let mut matched = Vec::new();
    let mut seen = MatchedLabels::new();

    for job in jobs {
        let labels = job_labels(job, config, info);
        if !selector.matches(&labels) {
            continue;
        }
        for (key, value) in labels {
            seen.entry(key).or_default().insert(value);
        }
        matched.push(job.clone());
    }

    trace!(
        workflow = %config.name,
        selector = %selector,
        total = jobs.len(),
        matched = matched.len(),
        "filtered queued runs"
    );
    (matched, seen)
}

/// Join each label's values with `,` in sorted order. Returns the three
/// Prometheus job labels (empty when unmatched) and the full map.
pub fn labels_for_output(matched: &MatchedLabels) -> ([String; 3], BTreeMap<String, String>) {
    let all: BTreeMap<String, String> = matched
        .iter()
        .map(|(k, values)| {
            (
                k.clone(),
                values.iter().cloned().collect::<Vec<_>>().join(","),
            )
        })
        .collect();

    let prometheus =
        JOB_LABELS_FOR_PROMETHEUS.map(|label| all.get(label).cloned().unwrap_or_default());
    (prometheus, all)
}
