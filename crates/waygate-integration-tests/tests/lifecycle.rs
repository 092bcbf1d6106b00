//! Agent lifecycle under the gateway: heartbeat reaping, grace-period
//! reconnects, and displacement.

use std::sync::Arc;
use std::time::Duration;
use waygate_core::capability::CapabilitySet;
use waygate_gateway::{Gateway, GatewayConfig};
use waygate_test::{TestAgent, memory_store};

fn paused_config() -> GatewayConfig {
    GatewayConfig::default()
        .with_heartbeat_timeout_secs(90)
        .with_reconnect_grace_secs(300)
        .with_reaper_sweep_secs(10)
}

#[tokio::test(start_paused = true)]
async fn silent_agent_disappears_from_lookups() {
    let gateway = Arc::new(Gateway::new(paused_config(), memory_store()).await.unwrap());
    let agent = TestAgent::attach(&gateway, "i1", "/w").await;
    assert_eq!(gateway.stats().await.ready_agents, 1);

    tokio::time::advance(Duration::from_secs(91)).await;
    assert_eq!(gateway.stats().await.ready_agents, 0);
    assert!(gateway
        .manager()
        .by_principal_and_workdir(agent.principal, "/w")
        .await
        .is_none());

    // One heartbeat restores readiness.
    agent.heartbeat().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(gateway.stats().await.ready_agents, 1);
    gateway.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_within_grace_restores_addressability() {
    let gateway = Arc::new(Gateway::new(paused_config(), memory_store()).await.unwrap());
    let principal;
    {
        let agent = TestAgent::attach(&gateway, "i1", "/w").await;
        principal = agent.principal;
        agent.disconnect();
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(gateway
        .manager()
        .by_principal_and_workdir(principal, "/w")
        .await
        .is_none());
    // Identity still held through the grace window.
    assert_eq!(gateway.stats().await.tracked_connections, 1);

    tokio::time::advance(Duration::from_secs(100)).await;
    let reconnected = TestAgent::attach_with(
        &gateway,
        principal,
        "i2",
        "/w",
        CapabilitySet::from_names(["base"]),
    )
    .await;

    let live = gateway
        .manager()
        .by_principal_and_workdir(principal, "/w")
        .await
        .unwrap();
    assert_eq!(live.id(), reconnected.connection.id());
    gateway.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn grace_expiry_forgets_the_identity() {
    let gateway = Arc::new(Gateway::new(paused_config(), memory_store()).await.unwrap());
    let agent = TestAgent::attach(&gateway, "i1", "/w").await;
    let principal = agent.principal;
    agent.disconnect();
    tokio::time::sleep(Duration::from_millis(10)).await;

    tokio::time::advance(Duration::from_secs(301)).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(gateway.stats().await.tracked_connections, 0);
    assert!(gateway
        .manager()
        .by_principal_and_workdir(principal, "/w")
        .await
        .is_none());
    gateway.shutdown().await;
}

#[tokio::test]
async fn newest_attachment_wins_the_identity() {
    let gateway = Arc::new(
        Gateway::new(GatewayConfig::default(), memory_store())
            .await
            .unwrap(),
    );
    let first = TestAgent::attach(&gateway, "i1", "/w").await;
    let principal = first.principal;

    let second = TestAgent::attach_with(
        &gateway,
        principal,
        "i2",
        "/w",
        CapabilitySet::from_names(["base"]),
    )
    .await;

    let live = gateway
        .manager()
        .by_principal_and_workdir(principal, "/w")
        .await
        .unwrap();
    assert_eq!(live.id(), second.connection.id());
    assert_eq!(gateway.stats().await.ready_agents, 1);
    gateway.shutdown().await;
}
