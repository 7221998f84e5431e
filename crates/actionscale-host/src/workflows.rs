//! Workflow sources: the in-memory store the host reads, and the loader
//! that refills it from the config file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use actionscale_core::config::SourcesConfig;
use actionscale_core::{AdapterConfig, ConfigError, WorkflowConfig};

/// Read access to the configured workflows.
pub trait WorkflowSource: Send + Sync {
    /// All workflows, sorted by name.
    fn all(&self) -> Vec<WorkflowConfig>;
    fn get(&self, name: &str) -> Option<WorkflowConfig>;
}

/// Workflows keyed by name. Readers see either the old or the new set
/// during a replace.
#[derive(Debug, Default)]
pub struct WorkflowStore {
    workflows: RwLock<BTreeMap<String, WorkflowConfig>>,
}

impl WorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_workflows(workflows: impl IntoIterator<Item = WorkflowConfig>) -> Self {
        let store = Self::new();
        store.replace(workflows);
        store
    }

    /// Swap in a complete new set.
    pub fn replace(&self, workflows: impl IntoIterator<Item = WorkflowConfig>) {
        let next: BTreeMap<String, WorkflowConfig> =
            workflows.into_iter().map(|wf| (wf.name.clone(), wf)).collect();
        *self.write() = next;
    }

    pub fn upsert(&self, workflow: WorkflowConfig) {
        self.write().insert(workflow.name.clone(), workflow);
    }

    pub fn remove(&self, name: &str) -> bool {
        self.write().remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, WorkflowConfig>> {
        self.workflows
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, WorkflowConfig>> {
        self.workflows
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl WorkflowSource for WorkflowStore {
    fn all(&self) -> Vec<WorkflowConfig> {
        self.read().values().cloned().collect()
    }

    fn get(&self, name: &str) -> Option<WorkflowConfig> {
        self.read().get(name).cloned()
    }
}

// ── Loading ───────────────────────────────────────────────────────

/// Result of one load pass.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub loaded: Vec<WorkflowConfig>,
    /// Workflow name and why it could not be loaded.
    pub failures: Vec<(String, ConfigError)>,
}

/// Produces the current set of workflows.
pub trait WorkflowLoader: Send + Sync {
    fn load(&self) -> Result<LoadOutcome, ConfigError>;
}

/// Reads `[[workflows]]` from the config file on every load, keeping only
/// the watched namespaces.
#[derive(Debug, Clone)]
pub struct FileWorkflowLoader {
    path: PathBuf,
    sources: SourcesConfig,
}

impl FileWorkflowLoader {
    pub fn new(path: impl Into<PathBuf>, sources: SourcesConfig) -> Self {
        Self {
            path: path.into(),
            sources,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WorkflowLoader for FileWorkflowLoader {
    fn load(&self) -> Result<LoadOutcome, ConfigError> {
        let config = AdapterConfig::from_file(&self.path)?;
        let mut outcome = LoadOutcome::default();
        for entry in config.workflows {
            if !self.sources.watches(&entry.namespace) {
                debug!(workflow = %entry.name, namespace = %entry.namespace, "namespace not watched");
                continue;
            }
            match entry.resolve() {
                Ok(wf) => outcome.loaded.push(wf),
                Err(e) => outcome.failures.push((entry.name.clone(), e)),
            }
        }
        Ok(outcome)
    }
}

/// What a resync pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResyncReport {
    pub loaded: usize,
    pub failed: usize,
    /// The store was swapped wholesale (no failures).
    pub replaced: bool,
}

/// Apply one load to the store. With no failures the store is replaced;
/// otherwise good workflows are upserted and everything else is kept.
pub fn resync(store: &WorkflowStore, loader: &dyn WorkflowLoader) -> Result<ResyncReport, ConfigError> {
    let outcome = loader.load()?;
    let loaded = outcome.loaded.len();
    let failed = outcome.failures.len();

    for (name, e) in &outcome.failures {
        warn!(workflow = %name, error = %e, "failed to load workflow");
    }

    let replaced = failed == 0;
    if replaced {
        store.replace(outcome.loaded);
    } else {
        for wf in outcome.loaded {
            store.upsert(wf);
        }
    }

    debug!(loaded, failed, replaced, total = store.len(), "workflows resynced");
    Ok(ResyncReport {
        loaded,
        failed,
        replaced,
    })
}

/// Resync every `interval` until shutdown.
pub async fn run_resync(
    store: Arc<WorkflowStore>,
    loader: Arc<dyn WorkflowLoader>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_secs = interval.as_secs(), "workflow resync started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                if let Err(e) = resync(&store, loader.as_ref()) {
                    error!(error = %e, "workflow resync failed, keeping current workflows");
                }
            }
            _ = shutdown.changed() => {
                info!("workflow resync shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actionscale_core::ScalingPolicy;
    use std::io::Write;
    use std::sync::Mutex;

    fn wf(name: &str, namespace: &str) -> WorkflowConfig {
        WorkflowConfig {
            name: name.to_string(),
            namespace: namespace.to_string(),
            token: "token".to_string(),
            owner: "octo".to_string(),
            repository: name.to_string(),
            scaling: ScalingPolicy::new(0, 5, 1.0).unwrap(),
        }
    }

    /// Loader that hands out queued outcomes in order, then fails.
    struct ScriptedLoader(Mutex<Vec<Result<LoadOutcome, ConfigError>>>);

    impl WorkflowLoader for ScriptedLoader {
        fn load(&self) -> Result<LoadOutcome, ConfigError> {
            let mut queue = self.0.lock().unwrap();
            if queue.is_empty() {
                return Err(ConfigError::Parse("script exhausted".to_string()));
            }
            queue.remove(0)
        }
    }

    #[test]
    fn store_crud() {
        let store = WorkflowStore::from_workflows([wf("b", "ns"), wf("a", "ns")]);
        assert_eq!(store.len(), 2);
        let names: Vec<String> = store.all().into_iter().map(|w| w.name).collect();
        assert_eq!(names, vec!["a", "b"]);

        let mut updated = wf("a", "other");
        updated.owner = "new-owner".to_string();
        store.upsert(updated);
        assert_eq!(store.get("a").unwrap().owner, "new-owner");

        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        assert!(store.get("a").is_none());
        assert!(!store.is_empty());
    }

    #[test]
    fn full_load_replaces_store() {
        let store = WorkflowStore::from_workflows([wf("old", "ns")]);
        let loader = ScriptedLoader(Mutex::new(vec![Ok(LoadOutcome {
            loaded: vec![wf("new", "ns")],
            failures: Vec::new(),
        })]));

        let report = resync(&store, &loader).unwrap();
        assert!(report.replaced);
        assert!(store.get("old").is_none());
        assert!(store.get("new").is_some());
    }

    #[test]
    fn partial_load_keeps_existing() {
        let store = WorkflowStore::from_workflows([wf("old", "ns"), wf("broken", "ns")]);
        let loader = ScriptedLoader(Mutex::new(vec![Ok(LoadOutcome {
            loaded: vec![wf("new", "ns")],
            failures: vec![(
                "broken".to_string(),
                ConfigError::Invalid("no token".to_string()),
            )],
        })]));

        let report = resync(&store, &loader).unwrap();
        assert_eq!(
            report,
            ResyncReport {
                loaded: 1,
                failed: 1,
                replaced: false
            }
        );
        assert_eq!(store.len(), 3);
        assert!(store.get("broken").is_some());
    }

    #[test]
    fn failed_load_leaves_store_untouched() {
        let store = WorkflowStore::from_workflows([wf("old", "ns")]);
        let loader = ScriptedLoader(Mutex::new(vec![Err(ConfigError::Parse("bad".to_string()))]));
        assert!(resync(&store, &loader).is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn file_loader_filters_namespaces_and_reports_failures() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"
[sources]
namespaces = ["runners"]

[[workflows]]
name = "good"
namespace = "runners"
owner = "octo"
repository = "hello"
token = "t"
max_workers = 3

[[workflows]]
name = "elsewhere"
namespace = "other"
owner = "octo"
repository = "hello"
token = "t"
max_workers = 3

[[workflows]]
name = "no-token"
namespace = "runners"
owner = "octo"
repository = "hello"
max_workers = 3
"#,
        )
        .unwrap();

        let sources = SourcesConfig {
            namespaces: vec!["runners".to_string()],
            ..SourcesConfig::default()
        };
        let loader = FileWorkflowLoader::new(file.path(), sources);
        let outcome = loader.load().unwrap();
        assert_eq!(outcome.loaded.len(), 1);
        assert_eq!(outcome.loaded[0].name, "good");
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, "no-token");
    }

    #[tokio::test]
    async fn run_resync_reloads_until_shutdown() {
        let store = Arc::new(WorkflowStore::new());
        let loader: Arc<dyn WorkflowLoader> = Arc::new(ScriptedLoader(Mutex::new(vec![Ok(
            LoadOutcome {
                loaded: vec![wf("a", "ns")],
                failures: Vec::new(),
            },
        )])));
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(run_resync(
            store.clone(),
            loader,
            Duration::from_millis(10),
            rx,
        ));
        for _ in 0..100 {
            if store.get("a").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(store.get("a").is_some());

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
