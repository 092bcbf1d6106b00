//! End-to-end tool routing: builtin dispatch, external pack
//! correlation, collision rejection, and pack death.

use std::sync::Arc;
use std::time::Duration;
use waygate_core::id::RequestId;
use waygate_core::protocol::{GatewayFrame, ToolCallOutcome};
use waygate_gateway::{Gateway, GatewayError};
use waygate_packs::{PackError, PackManifest, ToolDefinition};
use waygate_test::{TestAgent, TestPack, fast_config, memory_store};

async fn expect_tool_response(
    agent: &mut TestAgent,
    request_id: RequestId,
) -> ToolCallOutcome {
    match agent.recv().await {
        Some(GatewayFrame::ToolCallResponse {
            request_id: got,
            outcome,
        }) => {
            assert_eq!(got, request_id);
            outcome
        },
        other => panic!("expected tool response, got {other:?}"),
    }
}

#[tokio::test]
async fn builtin_todo_add_persists_a_row() {
    let store = memory_store();
    let gateway = Arc::new(
        Gateway::new(fast_config(), Arc::clone(&store)).await.unwrap(),
    );
    let mut agent = TestAgent::attach(&gateway, "i1", "/w").await;

    let request_id = RequestId::new();
    agent
        .call_tool(request_id, "todo_add", serde_json::json!({"description": "x"}))
        .await;

    match expect_tool_response(&mut agent, request_id).await {
        ToolCallOutcome::Output(out) => assert_eq!(out["description"], "x"),
        ToolCallOutcome::Error(err) => panic!("unexpected error: {err}"),
    }

    let todos = store.list_todos(agent.principal, true).await.unwrap();
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].description, "x");
    gateway.shutdown().await;
}

#[tokio::test]
async fn unknown_tool_is_a_tool_level_error() {
    let gateway = Arc::new(Gateway::new(fast_config(), memory_store()).await.unwrap());
    let mut agent = TestAgent::attach(&gateway, "i1", "/w").await;

    let request_id = RequestId::new();
    agent
        .call_tool(request_id, "no_such_tool", serde_json::json!({}))
        .await;
    match expect_tool_response(&mut agent, request_id).await {
        ToolCallOutcome::Error(err) => assert!(err.contains("not found")),
        ToolCallOutcome::Output(out) => panic!("unexpected output: {out}"),
    }
    gateway.shutdown().await;
}

#[tokio::test]
async fn external_pack_round_trip_through_an_agent() {
    let gateway = Arc::new(Gateway::new(fast_config(), memory_store()).await.unwrap());
    let manifest = PackManifest::new("echo-pack", "1.0.0")
        .with_tool(ToolDefinition::new("remote_echo", "echoes"));
    let _echo = TestPack::spawn_echo(&gateway, manifest).await;
    let mut agent = TestAgent::attach(&gateway, "i1", "/w").await;

    let request_id = RequestId::new();
    agent
        .call_tool(request_id, "remote_echo", serde_json::json!({"x": 7}))
        .await;
    match expect_tool_response(&mut agent, request_id).await {
        ToolCallOutcome::Output(out) => assert_eq!(out["echoed"]["x"], 7),
        ToolCallOutcome::Error(err) => panic!("unexpected error: {err}"),
    }
    gateway.shutdown().await;
}

#[tokio::test]
async fn concurrent_external_calls_correlate() {
    let gateway = Arc::new(Gateway::new(fast_config(), memory_store()).await.unwrap());
    let manifest = PackManifest::new("echo-pack", "1.0.0")
        .with_tool(ToolDefinition::new("remote_echo", "echoes"));
    let _echo = TestPack::spawn_echo(&gateway, manifest).await;

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move {
                let call = waygate_packs::ToolCall {
                    request_id: RequestId::new(),
                    tool_name: "remote_echo".to_string(),
                    input: serde_json::json!({"i": i}),
                    agent_id: waygate_core::id::PrincipalId::new(),
                };
                let id = call.request_id;
                let response = gateway.pack_router().route_tool_call(call).await.unwrap();
                assert_eq!(response.request_id, id);
                match response.outcome {
                    ToolCallOutcome::Output(out) => assert_eq!(out["echoed"]["i"], i),
                    ToolCallOutcome::Error(err) => panic!("unexpected error: {err}"),
                }
            })
        })
        .collect();
    for result in futures::future::join_all(tasks).await {
        result.unwrap();
    }
    assert_eq!(gateway.stats().await.pending_tool_calls, 0);
    gateway.shutdown().await;
}

#[tokio::test]
async fn colliding_manifest_is_rejected_without_partial_insert() {
    let gateway = Arc::new(Gateway::new(fast_config(), memory_store()).await.unwrap());
    let manifest_a =
        PackManifest::new("a", "1.0.0").with_tool(ToolDefinition::new("search", "s"));
    let _pack_a = TestPack::attach(&gateway, manifest_a).await;

    let manifest_b = PackManifest::new("b", "1.0.0")
        .with_tool(ToolDefinition::new("search", "s"))
        .with_tool(ToolDefinition::new("summarize", "s"));
    let (tx, _rx) = tokio::sync::mpsc::channel(8);
    let err = gateway.attach_pack(manifest_b, tx).await.unwrap_err();
    assert!(matches!(
        err,
        GatewayError::Pack(PackError::ToolCollision(_))
    ));

    // No partial insert; search still belongs to pack a.
    let registry = gateway.registry();
    assert!(registry.tool_by_name("summarize").await.is_none());
    assert!(!registry.is_builtin("summarize").await);
    let (_, pack) = registry.tool_by_name("search").await.unwrap();
    assert_eq!(pack.id().as_str(), "a");
    gateway.shutdown().await;
}

#[tokio::test]
async fn pack_death_mid_call_fails_the_caller() {
    let gateway = Arc::new(Gateway::new(fast_config(), memory_store()).await.unwrap());
    let manifest =
        PackManifest::new("p", "1.0.0").with_tool(ToolDefinition::new("slow", "stalls"));
    let mut pack = TestPack::attach(&gateway, manifest).await;
    let mut agent = TestAgent::attach(&gateway, "i1", "/w").await;

    let request_id = RequestId::new();
    agent.call_tool(request_id, "slow", serde_json::json!({})).await;

    // The pack receives the request, then dies without answering.
    let received = pack.requests.recv().await.unwrap();
    assert_eq!(received.request_id, request_id);
    pack.disconnect();

    match expect_tool_response(&mut agent, request_id).await {
        ToolCallOutcome::Error(err) => assert!(err.contains("disconnected")),
        ToolCallOutcome::Output(out) => panic!("unexpected output: {out}"),
    }

    // Bounded cleanup: no pending entry, no registered pack.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let stats = gateway.stats().await;
    assert_eq!(stats.pending_tool_calls, 0);
    assert_eq!(stats.live_packs, 0);
    gateway.shutdown().await;
}

#[tokio::test]
async fn discovery_is_capability_filtered_per_agent() {
    let gateway = Arc::new(Gateway::new(fast_config(), memory_store()).await.unwrap());
    let manifest = PackManifest::new("p", "1.0.0")
        .with_tool(ToolDefinition::new("open_tool", "ungated"))
        .with_tool(ToolDefinition::new("net_tool", "gated").with_capability("net"));
    let _pack = TestPack::attach(&gateway, manifest).await;

    let agent = TestAgent::attach(&gateway, "i1", "/w").await;
    let visible = gateway
        .tools_for_capabilities(agent.connection.capabilities())
        .await;
    let names: Vec<&str> = visible.iter().map(|t| t.name.as_str()).collect();
    assert!(names.contains(&"open_tool"));
    assert!(names.contains(&"todo_add"));
    assert!(!names.contains(&"net_tool"));
    gateway.shutdown().await;
}
