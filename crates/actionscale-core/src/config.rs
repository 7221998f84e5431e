//! actionscale.toml configuration parser.
//!
//! ```toml
//! [cache]
//! window = "1m"
//! window_when_empty = "30s"
//! backend = { kind = "redis", servers = ["redis://cache:6379"] }
//!
//! [server]
//! port = 8080
//!
//! [sources]
//! namespaces = ["runners"]
//! resync_interval = "5m"
//!
//! [[workflows]]
//! name = "build-runners"
//! namespace = "runners"
//! owner = "octo"
//! repository = "hello"
//! token_env = "GITHUB_TOKEN"
//! min_workers = 1
//! max_workers = 10
//! scale_factor = 0.5
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::serde_duration;
use crate::error::{ConfigError, ConfigResult};
use crate::scaling::{
    DEFAULT_FORCE_SCALE_UP_FREQUENCY, DEFAULT_FORCE_SCALE_UP_WINDOW, ScalingPolicy,
};
use crate::types::WorkflowConfig;

/// Environment variable consulted when a Redis backend has no password.
pub const REDIS_PASSWORD_ENV: &str = "REDIS_PASSWORD";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub workflows: Vec<WorkflowEntry>,
}

// ── Cache ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a non-empty snapshot is served before refetching.
    #[serde(default = "default_window", with = "serde_duration")]
    pub window: Duration,
    /// How long an empty snapshot is served before refetching.
    #[serde(default = "default_window_when_empty", with = "serde_duration")]
    pub window_when_empty: Duration,
    /// Upper bound on one data-source call.
    #[serde(default = "default_fetch_timeout", with = "serde_duration")]
    pub fetch_timeout: Duration,
    /// Coalesce concurrent refreshes of the same workflow.
    #[serde(default = "default_true")]
    pub single_flight: bool,
    #[serde(default)]
    pub backend: StateBackendConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            window_when_empty: default_window_when_empty(),
            fetch_timeout: default_fetch_timeout(),
            single_flight: true,
            backend: StateBackendConfig::default(),
        }
    }
}

/// Where client state and workflow info are cached.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StateBackendConfig {
    /// Process-local maps. Lost on restart, not shared between replicas.
    #[default]
    Memory,
    /// Shared Redis nodes; keys are spread over `servers` by hash.
    Redis {
        servers: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
        #[serde(default = "default_op_timeout", with = "serde_duration")]
        op_timeout: Duration,
    },
}

impl StateBackendConfig {
    /// Fill a missing Redis password from `REDIS_PASSWORD`.
    pub fn with_env_password(self) -> Self {
        match self {
            Self::Redis {
                servers,
                username,
                password: None,
                op_timeout,
            } => Self::Redis {
                servers,
                username,
                password: std::env::var(REDIS_PASSWORD_ENV).ok().filter(|p| !p.is_empty()),
                op_timeout,
            },
            other => other,
        }
    }
}

impl std::fmt::Debug for StateBackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => f.write_str("Memory"),
            Self::Redis {
                servers,
                username,
                password,
                op_timeout,
            } => f
                .debug_struct("Redis")
                .field("servers", servers)
                .field("username", username)
                .field("password", &password.as_ref().map(|_| "<redacted>"))
                .field("op_timeout", op_timeout)
                .finish(),
        }
    }
}

// ── Server ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

// ── Workflow sources ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// How often the workflow list is fully reloaded.
    #[serde(default = "default_resync_interval", with = "serde_duration")]
    pub resync_interval: Duration,
    #[serde(default)]
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub all_namespaces: bool,
    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            resync_interval: default_resync_interval(),
            namespaces: Vec::new(),
            all_namespaces: false,
            github_api_url: default_github_api_url(),
        }
    }
}

impl SourcesConfig {
    /// Whether workflows in `namespace` are served.
    pub fn watches(&self, namespace: &str) -> bool {
        self.all_namespaces || self.namespaces.iter().any(|ns| ns == namespace)
    }
}

/// One `[[workflows]]` table.
#[derive(Clone, Serialize, Deserialize)]
pub struct WorkflowEntry {
    pub name: String,
    pub namespace: String,
    pub owner: String,
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Environment variable holding the token when `token` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
    #[serde(default)]
    pub min_workers: u32,
    pub max_workers: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_scale_up_window_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_scale_up_frequency_days: Option<u64>,
}

impl std::fmt::Debug for WorkflowEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEntry")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("owner", &self.owner)
            .field("repository", &self.repository)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("token_env", &self.token_env)
            .field("min_workers", &self.min_workers)
            .field("max_workers", &self.max_workers)
            .field("scale_factor", &self.scale_factor)
            .finish()
    }
}

impl WorkflowEntry {
    /// Turn the entry into a validated `WorkflowConfig`, reading the token
    /// from the environment when needed.
    pub fn resolve(&self) -> ConfigResult<WorkflowConfig> {
        let token = match (&self.token, &self.token_env) {
            (Some(token), _) if !token.is_empty() => token.clone(),
            (_, Some(var)) => std::env::var(var).map_err(|_| ConfigError::MissingToken {
                name: self.name.clone(),
                reason: format!("environment variable {var} is not set"),
            })?,
            _ => {
                return Err(ConfigError::MissingToken {
                    name: self.name.clone(),
                    reason: "set token or token_env".to_string(),
                });
            }
        };

        let window = self
            .force_scale_up_window_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_FORCE_SCALE_UP_WINDOW);
        let frequency = self
            .force_scale_up_frequency_days
            .map(|days| Duration::from_secs(days.saturating_mul(86_400)))
            .unwrap_or(DEFAULT_FORCE_SCALE_UP_FREQUENCY);

        let scaling = ScalingPolicy::new(
            self.min_workers,
            self.max_workers,
            self.scale_factor.unwrap_or(1.0),
        )
        .map_err(|e| match e {
            ConfigError::Scaling { reason, .. } => ConfigError::Scaling {
                name: self.name.clone(),
                reason,
            },
            other => other,
        })?
        .with_forced_scale(window, frequency);

        Ok(WorkflowConfig {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            token,
            owner: self.owner.clone(),
            repository: self.repository.clone(),
            scaling,
        })
    }
}

impl AdapterConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Check settings that serde cannot express: the namespace selection,
    /// unique workflow names, and every workflow's scaling bounds.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.sources.namespaces.is_empty() && !self.sources.all_namespaces {
            return Err(ConfigError::Invalid(
                "specify sources.namespaces or sources.all_namespaces".to_string(),
            ));
        }
        if !self.sources.namespaces.is_empty() && self.sources.all_namespaces {
            return Err(ConfigError::Invalid(
                "can't specify sources.namespaces and sources.all_namespaces".to_string(),
            ));
        }
        if let StateBackendConfig::Redis { servers, .. } = &self.cache.backend {
            if servers.is_empty() {
                return Err(ConfigError::Invalid(
                    "redis backend needs at least one server".to_string(),
                ));
            }
        }

        let mut seen = HashSet::new();
        for wf in &self.workflows {
            if !seen.insert(wf.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate workflow name '{}'",
                    wf.name
                )));
            }
            if wf.min_workers > wf.max_workers {
                return Err(ConfigError::Scaling {
                    name: wf.name.clone(),
                    reason: format!(
                        "min_workers {} exceeds max_workers {}",
                        wf.min_workers, wf.max_workers
                    ),
                });
            }
            match wf.scale_factor {
                Some(factor) if !factor.is_finite() || factor < 0.0 => {
                    return Err(ConfigError::Scaling {
                        name: wf.name.clone(),
                        reason: format!("scale_factor must be a non-negative number, got {factor}"),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn default_window() -> Duration {
    Duration::from_secs(60)
}

fn default_window_when_empty() -> Duration {
    Duration::from_secs(30)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_op_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_resync_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}
