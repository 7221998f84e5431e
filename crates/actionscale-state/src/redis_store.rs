//! Shared state provider backed by one or more Redis nodes.
//!
//! Keys are spread across nodes by a stable SHA-256 hash so every replica
//! reads and writes a given workflow on the same node. Values are JSON.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rand::distr::Alphanumeric;
use redis::aio::ConnectionManager;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use url::Url;

use actionscale_core::WorkflowInfoMap;

use crate::StateProvider;
use crate::error::{StateError, StateResult};
use crate::types::ClientState;

/// Lifetime of a cached client state entry.
pub const STATE_TTL_SECS: u64 = 3600;

/// Lifetime of a cached workflow-info entry.
pub const WORKFLOW_INFO_TTL_SECS: u64 = 300;

struct Node {
    /// Server address with the password redacted, for logs and errors.
    display: String,
    conn: ConnectionManager,
}

/// Redis-backed [`StateProvider`].
pub struct RedisStateProvider {
    nodes: Vec<Node>,
    op_timeout: Duration,
}

impl std::fmt::Debug for RedisStateProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStateProvider")
            .field(
                "nodes",
                &self.nodes.iter().map(|n| n.display.as_str()).collect::<Vec<_>>(),
            )
            .field("op_timeout", &self.op_timeout)
            .finish()
    }
}

impl RedisStateProvider {
    /// Connect to every server and check it with a throwaway write.
    /// Fails if any node is unreachable.
    pub async fn connect(
        servers: &[String],
        username: Option<&str>,
        password: Option<&str>,
        op_timeout: Duration,
    ) -> StateResult<Self> {
        if servers.is_empty() {
            return Err(StateError::Connect("no redis servers configured".to_string()));
        }

        let mut nodes = Vec::with_capacity(servers.len());
        for server in servers {
            let url = server_url(server, username, password)?;
            let display = redacted_url(&url);
            let client = redis::Client::open(url.as_str())
                .map_err(|e| StateError::Connect(format!("{display}: {e}")))?;
            let conn = bounded(op_timeout, &display, client.get_connection_manager())
                .await?
                .map_err(|e| StateError::Connect(format!("{display}: {e}")))?;

            let node = Node { display, conn };
            check_writable(&node, op_timeout).await?;
            debug!(server = %node.display, "redis node reachable");
            nodes.push(node);
        }

        info!(nodes = nodes.len(), "redis state provider connected");
        Ok(Self { nodes, op_timeout })
    }

    fn node_for(&self, key: &str) -> &Node {
        &self.nodes[node_index(key, self.nodes.len())]
    }

    async fn get_raw(&self, key: &str) -> StateResult<Option<String>> {
        let node = self.node_for(key);
        let mut conn = node.conn.clone();
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        let fut = cmd.query_async::<Option<String>>(&mut conn);
        bounded(self.op_timeout, &node.display, fut)
            .await?
            .map_err(|e| StateError::Unreachable(format!("{}: {e}", node.display)))
    }

    async fn set_raw(&self, key: &str, value: String, ttl_secs: u64) -> StateResult<()> {
        let node = self.node_for(key);
        let mut conn = node.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("EX").arg(ttl_secs);
        let fut = cmd.query_async::<()>(&mut conn);
        bounded(self.op_timeout, &node.display, fut)
            .await?
            .map_err(|e| StateError::Unreachable(format!("{}: {e}", node.display)))
    }
}

#[async_trait]
impl StateProvider for RedisStateProvider {
    async fn get_state(&self, key: &str) -> StateResult<ClientState> {
        let raw = self.get_raw(key).await?;
        decode_state(key, raw.as_deref()).inspect_err(|e| {
            warn!(%key, error = %e, "undecodable state entry");
        })
    }

    async fn set_state(&self, key: &str, state: &ClientState) -> StateResult<()> {
        self.set_raw(key, state.to_json()?, STATE_TTL_SECS).await
    }

    async fn get_workflow_info(&self, key: &str) -> StateResult<Option<WorkflowInfoMap>> {
        let raw = self.get_raw(key).await?;
        decode_workflow_info(raw.as_deref()).inspect_err(|e| {
            warn!(%key, error = %e, "undecodable workflow info entry");
        })
    }

    async fn set_workflow_info(&self, key: &str, info: &WorkflowInfoMap) -> StateResult<()> {
        let raw = serde_json::to_string(info).map_err(|e| StateError::Serialize(e.to_string()))?;
        self.set_raw(key, raw, WORKFLOW_INFO_TTL_SECS).await
    }

    async fn ping(&self) -> StateResult<()> {
        for node in &self.nodes {
            let mut conn = node.conn.clone();
            let cmd = redis::cmd("PING");
            let fut = cmd.query_async::<String>(&mut conn);
            bounded(self.op_timeout, &node.display, fut)
                .await?
                .map_err(|e| StateError::Unreachable(format!("{}: {e}", node.display)))?;
        }
        Ok(())
    }
}

async fn check_writable(node: &Node, op_timeout: Duration) -> StateResult<()> {
    let key = format!("test_{}", random_suffix(5));
    let mut conn = node.conn.clone();
    let mut cmd = redis::cmd("SET");
    cmd.arg(&key).arg("ok").arg("EX").arg(1);
    let fut = cmd.query_async::<()>(&mut conn);
    bounded(op_timeout, &node.display, fut)
        .await?
        .map_err(|e| StateError::Connect(format!("{}: {e}", node.display)))
}

/// A nil reply is a fresh state. A reply that fails to decode is an error.
fn decode_state(key: &str, raw: Option<&str>) -> StateResult<ClientState> {
    match raw {
        None => {
            debug!(%key, "state miss");
            Ok(ClientState::new(key))
        }
        Some(raw) => ClientState::from_json(raw),
    }
}

fn decode_workflow_info(raw: Option<&str>) -> StateResult<Option<WorkflowInfoMap>> {
    raw.map(|raw| serde_json::from_str(raw).map_err(|e| StateError::Deserialize(e.to_string())))
        .transpose()
}

/// Run a redis future under the operation timeout.
async fn bounded<T>(
    limit: Duration,
    display: &str,
    fut: impl Future<Output = T>,
) -> StateResult<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| StateError::Timeout(format!("{display} after {limit:?}")))
}

fn random_suffix(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Stable node index for a key.
pub fn node_index(key: &str, nodes: usize) -> usize {
    if nodes <= 1 {
        return 0;
    }
    let digest = Sha256::digest(key.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(head) % nodes as u64) as usize
}

/// Parse a server address (`host:port` or `redis://...`) and attach
/// credentials.
fn server_url(server: &str, username: Option<&str>, password: Option<&str>) -> StateResult<Url> {
    let raw = if server.contains("://") {
        server.to_string()
    } else {
        format!("redis://{server}")
    };
    let mut url = Url::parse(&raw).map_err(|e| StateError::Connect(format!("{server}: {e}")))?;
    if let Some(user) = username {
        url.set_username(user)
            .map_err(|_| StateError::Connect(format!("{server}: cannot set username")))?;
    }
    if let Some(pass) = password {
        url.set_password(Some(pass))
            .map_err(|_| StateError::Connect(format!("{server}: cannot set password")))?;
    }
    Ok(url)
}

/// Keep the first three characters of a password.
pub fn redact_password(password: &str) -> String {
    let head: String = password.chars().take(3).collect();
    format!("{head}******")
}

fn redacted_url(url: &Url) -> String {
    let mut shown = url.clone();
    if let Some(pass) = url.password() {
        let _ = shown.set_password(Some(&redact_password(pass)));
    }
    shown.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_all_but_prefix() {
        assert_eq!(redact_password("hunter2"), "hun******");
        assert_eq!(redact_password("ab"), "ab******");
    }

    #[test]
    fn server_url_accepts_bare_host() {
        let url = server_url("cache:6379", Some("svc"), Some("secretpw")).unwrap();
        assert_eq!(url.scheme(), "redis");
        assert_eq!(url.host_str(), Some("cache"));
        assert_eq!(url.port(), Some(6379));
        assert_eq!(url.username(), "svc");
        assert_eq!(url.password(), Some("secretpw"));

        let shown = redacted_url(&url);
        assert!(!shown.contains("secretpw"));
        assert!(shown.contains("sec******"));
    }

    #[test]
    fn server_url_keeps_scheme() {
        let url = server_url("rediss://cache.example:6380/2", None, None).unwrap();
        assert_eq!(url.scheme(), "rediss");
        assert_eq!(url.path(), "/2");
    }

    #[test]
    fn node_index_is_stable_and_in_range() {
        for nodes in 1..5 {
            for key in ["a", "wf-build", "octo/hello", ""] {
                let idx = node_index(key, nodes);
                assert!(idx < nodes);
                assert_eq!(idx, node_index(key, nodes));
            }
        }
        assert_eq!(node_index("anything", 0), 0);
    }

    #[test]
    fn node_index_spreads_keys() {
        let used: std::collections::HashSet<usize> =
            (0..64).map(|i| node_index(&format!("wf-{i}"), 3)).collect();
        assert_eq!(used.len(), 3);
    }

    #[test]
    fn nil_reply_is_a_miss() {
        let state = decode_state("wf", None).unwrap();
        assert_eq!(state, ClientState::new("wf"));
        assert!(decode_workflow_info(None).unwrap().is_none());
    }

    #[test]
    fn stored_entries_decode() {
        let mut state = ClientState::new("wf");
        state.status = crate::types::Status::Valid;
        let raw = state.to_json().unwrap();
        assert_eq!(decode_state("wf", Some(&raw)).unwrap(), state);

        let info = decode_workflow_info(Some(r#"{"7":{"id":7,"name":"Build","labels":["linux"]}}"#))
            .unwrap()
            .unwrap();
        assert_eq!(info[&7].name, "Build");
    }

    #[test]
    fn corrupt_entries_are_errors_not_misses() {
        assert!(matches!(
            decode_state("wf", Some("{not json")),
            Err(StateError::Deserialize(_))
        ));
        assert!(matches!(
            decode_state("wf", Some(r#"{"Name":"wf","Status":9}"#)),
            Err(StateError::Deserialize(_))
        ));
        assert!(matches!(
            decode_workflow_info(Some("[1, 2")),
            Err(StateError::Deserialize(_))
        ));
    }

    #[test]
    fn throwaway_keys_are_random() {
        let a = random_suffix(5);
        assert_eq!(a.len(), 5);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn connect_requires_servers() {
        let err = RedisStateProvider::connect(&[], None, None, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::Connect(_)));
    }

    #[tokio::test]
    async fn unreachable_server_fails_fast_without_leaking_password() {
        let err = RedisStateProvider::connect(
            &["redis://127.0.0.1:1".to_string()],
            None,
            Some("topsecret"),
            Duration::from_millis(500),
        )
        .await
        .unwrap_err();
        let msg = err.to_string();
        assert!(!msg.contains("topsecret"), "password leaked: {msg}");
        assert!(matches!(err, StateError::Connect(_) | StateError::Timeout(_)));
    }
}
