//! Redis backend against a real server.
//!
//! These start a Redis container and are ignored by default. Run with
//! `cargo test -p actionscale-state -- --ignored` on a host with Docker.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::redis::Redis;

use actionscale_core::{JobRecord, WorkflowInfo, WorkflowInfoMap};
use actionscale_state::redis_store::{STATE_TTL_SECS, WORKFLOW_INFO_TTL_SECS};
use actionscale_state::{ClientState, RedisStateProvider, StateError, StateProvider, Status};

struct RedisSetup {
    container: ContainerAsync<Redis>,
    address: String,
}

impl RedisSetup {
    async fn new() -> Self {
        let container = Redis::default().with_tag("7-alpine").start().await.unwrap();
        let port = container.get_host_port_ipv4(6379).await.unwrap();
        Self {
            container,
            address: format!("127.0.0.1:{port}"),
        }
    }

    async fn provider(&self) -> RedisStateProvider {
        RedisStateProvider::connect(
            std::slice::from_ref(&self.address),
            None,
            None,
            Duration::from_secs(2),
        )
        .await
        .unwrap()
    }

    async fn raw_connection(&self) -> redis::aio::MultiplexedConnection {
        redis::Client::open(format!("redis://{}", self.address))
            .unwrap()
            .get_multiplexed_async_connection()
            .await
            .unwrap()
    }

    async fn ttl(&self, key: &str) -> i64 {
        let mut conn = self.raw_connection().await;
        let mut cmd = redis::cmd("TTL");
        cmd.arg(key);
        cmd.query_async::<i64>(&mut conn).await.unwrap()
    }

    async fn write_raw(&self, key: &str, value: &str) {
        let mut conn = self.raw_connection().await;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        cmd.query_async::<()>(&mut conn).await.unwrap();
    }
}

fn sample_info() -> WorkflowInfoMap {
    let mut info = WorkflowInfoMap::new();
    info.insert(
        3,
        WorkflowInfo {
            id: 3,
            name: "Build".to_string(),
            labels: vec!["linux".to_string()],
        },
    );
    info
}

#[tokio::test]
#[ignore = "requires docker"]
async fn missing_keys_are_misses() {
    let setup = RedisSetup::new().await;
    let provider = setup.provider().await;

    let state = provider.get_state("never-written").await.unwrap();
    assert_eq!(state, ClientState::new("never-written"));
    assert_eq!(state.status, Status::Unset);

    assert!(provider.get_workflow_info("octo/none").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn entries_round_trip_with_ttls() {
    let setup = RedisSetup::new().await;
    let provider = setup.provider().await;

    let mut state = ClientState::new("build");
    state.last_value = vec![JobRecord::new(11, 3, "queued")];
    state.last_request = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    state.status = Status::Valid;
    provider.set_state("build", &state).await.unwrap();
    provider.set_workflow_info("octo/app", &sample_info()).await.unwrap();

    assert_eq!(provider.get_state("build").await.unwrap(), state);
    assert_eq!(
        provider.get_workflow_info("octo/app").await.unwrap(),
        Some(sample_info())
    );

    let state_ttl = setup.ttl("build").await;
    assert!(
        (STATE_TTL_SECS as i64 - 10..=STATE_TTL_SECS as i64).contains(&state_ttl),
        "state ttl {state_ttl}"
    );
    let info_ttl = setup.ttl("octo/app").await;
    assert!(
        (WORKFLOW_INFO_TTL_SECS as i64 - 10..=WORKFLOW_INFO_TTL_SECS as i64).contains(&info_ttl),
        "workflow info ttl {info_ttl}"
    );
}

#[tokio::test]
#[ignore = "requires docker"]
async fn corrupt_entries_are_errors() {
    let setup = RedisSetup::new().await;
    let provider = setup.provider().await;

    setup.write_raw("build", "{\"Name\":").await;
    setup.write_raw("octo/app", "not json").await;

    assert!(matches!(
        provider.get_state("build").await,
        Err(StateError::Deserialize(_))
    ));
    assert!(matches!(
        provider.get_workflow_info("octo/app").await,
        Err(StateError::Deserialize(_))
    ));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn outage_is_an_error_not_a_miss() {
    let setup = RedisSetup::new().await;
    let provider = setup.provider().await;
    provider.set_state("build", &ClientState::new("build")).await.unwrap();
    provider.ping().await.unwrap();

    setup.container.stop().await.unwrap();

    let err = provider.get_state("build").await.unwrap_err();
    assert!(
        matches!(err, StateError::Unreachable(_) | StateError::Timeout(_)),
        "unexpected error: {err}"
    );
    assert!(provider.get_workflow_info("octo/app").await.is_err());
    assert!(provider.ping().await.is_err());
}
