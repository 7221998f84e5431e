//! actionscale-labels — label selectors over queued workflow runs.
//!
//! Every queued run gets a label set derived from its workflow config and
//! its workflow definition:
//!
//! ```text
//! wf_id               workflow definition id
//! wf_name             sanitized definition name ("unknown" without info)
//! wf_runs_on          runs-on labels, sorted, '.'→'_', joined with '.'
//! wf_runs_on_<label>  one per runs-on label, value = the label
//! cr_name, cr_namespace, cr_repo, cr_owner
//! ```
//!
//! A [`Selector`] (Kubernetes label-selector syntax) picks the runs that
//! count towards a metric; the matched label values are aggregated for
//! the metric output.

pub mod error;
pub mod filter;
pub mod selector;

pub use error::{SelectorError, SelectorResult};
pub use filter::{
    CR_NAME_LABEL, CR_NAMESPACE_LABEL, CR_OWNER_LABEL, CR_REPO_LABEL, JOB_LABELS_FOR_PROMETHEUS,
    MatchedLabels, WF_ALL_RUNS_ON_LABEL, WF_ID_LABEL, WF_NAME_LABEL, filter_by_selector,
    job_labels, labels_for_output, runs_on_label, sanitize_label_value,
};
pub use selector::{LabelSet, Operator, Requirement, Selector};
