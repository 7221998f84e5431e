//! Process-local state provider.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::trace;

use actionscale_core::WorkflowInfoMap;

use crate::StateProvider;
use crate::error::StateResult;
use crate::types::ClientState;

/// State held in two maps, each behind its own read/write lock. Entries
/// never expire.
#[derive(Debug, Default)]
pub struct InMemoryStateProvider {
    states: RwLock<HashMap<String, ClientState>>,
    workflow_info: RwLock<HashMap<String, WorkflowInfoMap>>,
}

impl InMemoryStateProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateProvider for InMemoryStateProvider {
    async fn get_state(&self, key: &str) -> StateResult<ClientState> {
        let states = self.states.read().await;
        match states.get(key) {
            Some(state) => Ok(state.clone()),
            None => {
                trace!(%key, "state miss");
                Ok(ClientState::new(key))
            }
        }
    }

    async fn set_state(&self, key: &str, state: &ClientState) -> StateResult<()> {
        self.states
            .write()
            .await
            .insert(key.to_string(), state.clone());
        Ok(())
    }

    async fn get_workflow_info(&self, key: &str) -> StateResult<Option<WorkflowInfoMap>> {
        Ok(self.workflow_info.read().await.get(key).cloned())
    }

    async fn set_workflow_info(&self, key: &str, info: &WorkflowInfoMap) -> StateResult<()> {
        self.workflow_info
            .write()
            .await
            .insert(key.to_string(), info.clone());
        Ok(())
    }

    async fn ping(&self) -> StateResult<()> {
        Ok(())
    }
}
