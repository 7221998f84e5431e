//! actionscale-state — cache state store for workflow queue snapshots.
//!
//! Two tables, both keyed by string:
//!
//! ```text
//! workflow name  → ClientState     (queue snapshot, refresh status, forced-scale schedule)
//! "owner/repo"   → WorkflowInfoMap (workflow definition id → name + runs-on labels)
//! ```
//!
//! A missing key is a miss, not an error: `get_state` returns a fresh
//! `Unset` state and `get_workflow_info` returns `None`. Any backend
//! failure is reported as a [`StateError`] so callers never mistake an
//! unreachable cache for an empty one.

pub mod error;
pub mod memory;
pub mod redis_store;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use actionscale_core::WorkflowInfoMap;
use actionscale_core::config::StateBackendConfig;

pub use error::{StateError, StateResult};
pub use memory::InMemoryStateProvider;
pub use redis_store::RedisStateProvider;
pub use types::{ClientState, Status};

/// Storage for client state and workflow info.
#[async_trait]
pub trait StateProvider: Send + Sync {
    async fn get_state(&self, key: &str) -> StateResult<ClientState>;
    async fn set_state(&self, key: &str, state: &ClientState) -> StateResult<()>;
    async fn get_workflow_info(&self, key: &str) -> StateResult<Option<WorkflowInfoMap>>;
    async fn set_workflow_info(&self, key: &str, info: &WorkflowInfoMap) -> StateResult<()>;
    /// Round-trip to the backend; backs `/readyz`.
    async fn ping(&self) -> StateResult<()>;
}

/// Build the provider selected by configuration.
pub async fn connect(backend: &StateBackendConfig) -> StateResult<Arc<dyn StateProvider>> {
    match backend.clone().with_env_password() {
        StateBackendConfig::Memory => {
            info!("using in-memory state provider");
            Ok(Arc::new(InMemoryStateProvider::new()))
        }
        StateBackendConfig::Redis {
            servers,
            username,
            password,
            op_timeout,
        } => {
            let provider = RedisStateProvider::connect(
                &servers,
                username.as_deref(),
                password.as_deref(),
                op_timeout,
            )
            .await?;
            Ok(Arc::new(provider))
        }
    }
}
