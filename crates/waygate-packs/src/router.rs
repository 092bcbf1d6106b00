//! Tool call dispatch and response correlation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use serde_json::Value;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error, warn};
use waygate_core::id::{PackId, PrincipalId, RequestId};

use crate::error::{PackError, PackResult};
use crate::registry::PackRegistry;
use crate::types::{ExecuteToolRequest, ToolResponse};

/// Default timeout for external tool calls.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// One named tool invocation on behalf of an agent.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Correlation id; at most one in-flight call per id.
    pub request_id: RequestId,
    /// Globally-unique tool name.
    pub tool_name: String,
    /// Tool input.
    pub input: Value,
    /// The agent making the call.
    pub agent_id: PrincipalId,
}

struct PendingEntry {
    tx: mpsc::Sender<ToolResponse>,
    pack_id: PackId,
}

/// Routes tool calls to builtin handlers or external packs.
///
/// Builtin calls run synchronously on the calling task. External calls
/// register a pending entry, enqueue the request on the pack's stream,
/// and await the correlated response under the effective timeout.
pub struct PackRouter {
    registry: Arc<PackRegistry>,
    pending: RwLock<HashMap<RequestId, PendingEntry>>,
    default_timeout: Duration,
}

impl PackRouter {
    /// Create a router over a registry with the default timeout.
    #[must_use]
    pub fn new(registry: Arc<PackRegistry>) -> Self {
        Self::with_default_timeout(registry, DEFAULT_TOOL_TIMEOUT)
    }

    /// Create a router with a specific default timeout.
    #[must_use]
    pub fn with_default_timeout(registry: Arc<PackRegistry>, default_timeout: Duration) -> Self {
        Self {
            registry,
            pending: RwLock::new(HashMap::new()),
            default_timeout,
        }
    }

    /// The registry this router dispatches through.
    #[must_use]
    pub fn registry(&self) -> &Arc<PackRegistry> {
        &self.registry
    }

    /// Dispatch one tool call and wait for its result.
    ///
    /// A builtin handler error is wrapped as a tool-level error response,
    /// not surfaced as a routing error; routing errors are reserved for
    /// unknown tools, disconnected packs, duplicates, and timeouts.
    ///
    /// # Errors
    ///
    /// [`PackError::ToolNotFound`], [`PackError::DuplicateRequestId`],
    /// [`PackError::PackDisconnected`], or [`PackError::Timeout`].
    pub async fn route_tool_call(&self, call: ToolCall) -> PackResult<ToolResponse> {
        if let Some((_, handler)) = self.registry.builtin_tool(&call.tool_name).await {
            debug!(tool = %call.tool_name, request = %call.request_id, "Dispatching builtin tool");
            return match handler.execute(call.agent_id, call.input).await {
                Ok(output) => Ok(ToolResponse::output(call.request_id, output)),
                Err(err) => Ok(ToolResponse::error(call.request_id, err.to_string())),
            };
        }

        let Some((def, pack)) = self.registry.tool_by_name(&call.tool_name).await else {
            return Err(PackError::ToolNotFound(call.tool_name));
        };

        // Register the waiter before the send so the response cannot
        // outrun us.
        let mut rx = {
            let mut pending = self.pending.write().await;
            if pending.contains_key(&call.request_id) {
                error!(request = %call.request_id, "Duplicate tool request id");
                return Err(PackError::DuplicateRequestId(call.request_id));
            }
            let (tx, rx) = mpsc::channel(1);
            pending.insert(
                call.request_id,
                PendingEntry {
                    tx,
                    pack_id: pack.id().clone(),
                },
            );
            rx
        };

        let timeout = def
            .timeout_seconds
            .filter(|s| *s > 0)
            .map_or(self.default_timeout, Duration::from_secs);

        let request = ExecuteToolRequest {
            request_id: call.request_id,
            tool_name: call.tool_name.clone(),
            input: call.input,
            agent_id: call.agent_id,
        };

        let outcome = tokio::time::timeout(timeout, async {
            match pack.send(request).await {
                Ok(()) => {},
                // The queue being gone either way means the pack is no
                // longer reachable from this call's point of view.
                Err(PackError::PackClosed | PackError::PackDisconnected) => {
                    return Err(PackError::PackDisconnected);
                },
                Err(other) => return Err(other),
            }
            match rx.recv().await {
                Some(response) => Ok(response),
                None => Err(PackError::PackDisconnected),
            }
        })
        .await;

        self.pending.write().await.remove(&call.request_id);

        match outcome {
            Ok(result) => result,
            Err(_elapsed) => Err(PackError::Timeout {
                tool: call.tool_name,
                seconds: timeout.as_secs(),
            }),
        }
    }

    /// Deliver a pack's response to the waiting caller.
    ///
    /// Responses for unknown or already-expired request ids are logged
    /// and dropped.
    pub async fn handle_tool_response(&self, response: ToolResponse) {
        // Hold the write lock across the send so cleanup cannot close the
        // channel mid-delivery.
        let pending = self.pending.write().await;
        let Some(entry) = pending.get(&response.request_id) else {
            warn!(request = %response.request_id, "Tool response for unknown request dropped");
            return;
        };
        match entry.tx.try_send(response) {
            Ok(()) => {},
            Err(mpsc::error::TrySendError::Full(resp)) => {
                // Buffer is 1 and there is at most one responder, so this
                // indicates a misbehaving pack double-responding.
                warn!(request = %resp.request_id, "Second tool response dropped");
            },
            Err(mpsc::error::TrySendError::Closed(resp)) => {
                debug!(request = %resp.request_id, "Tool response arrived after caller left");
            },
        }
    }

    /// Fail every pending call routed to the given pack.
    ///
    /// Dropping the waiters' senders makes each observe a closed channel
    /// and surface [`PackError::PackDisconnected`].
    pub async fn fail_pack(&self, pack_id: &PackId) {
        let mut pending = self.pending.write().await;
        pending.retain(|request_id, entry| {
            if &entry.pack_id == pack_id {
                debug!(request = %request_id, pack = %pack_id, "Failing pending call: pack gone");
                false
            } else {
                true
            }
        });
    }

    /// Number of in-flight external calls.
    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }

    /// Fail every pending call and clear the table.
    pub async fn close(&self) {
        self.pending.write().await.clear();
    }
}

impl std::fmt::Debug for PackRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackRouter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::BuiltinTool;
    use crate::error::{ToolError, ToolResult};
    use crate::registry::BuiltinPack;
    use crate::types::{PackManifest, ToolDefinition};
    use async_trait::async_trait;
    use waygate_core::protocol::ToolCallOutcome;

    struct EchoInput;

    #[async_trait]
    impl BuiltinTool for EchoInput {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn description(&self) -> &'static str {
            "echoes its input"
        }
        fn input_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _agent_id: PrincipalId, input: Value) -> ToolResult<Value> {
            Ok(input)
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl BuiltinTool for AlwaysFails {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn description(&self) -> &'static str {
            "always fails"
        }
        fn input_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _agent_id: PrincipalId, _input: Value) -> ToolResult<Value> {
            Err(ToolError::ExecutionFailed("nope".into()))
        }
    }

    fn call(tool: &str) -> ToolCall {
        ToolCall {
            request_id: RequestId::new(),
            tool_name: tool.into(),
            input: serde_json::json!({"x": 1}),
            agent_id: PrincipalId::new(),
        }
    }

    async fn router_with_echo_pack() -> (Arc<PackRouter>, tokio::task::JoinHandle<()>) {
        let registry = Arc::new(PackRegistry::new());
        let manifest = PackManifest::new("echo-pack", "1.0.0")
            .with_tool(ToolDefinition::new("remote_echo", "echoes remotely"));
        let mut rx = registry.register_pack(manifest).await.unwrap();
        let router = Arc::new(PackRouter::new(registry));

        // A cooperative pack: echo every request back through the router.
        let echo = {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                while let Some(req) = rx.recv().await {
                    router
                        .handle_tool_response(ToolResponse::output(
                            req.request_id,
                            serde_json::json!({"echoed": req.input}),
                        ))
                        .await;
                }
            })
        };
        (router, echo)
    }

    #[tokio::test]
    async fn builtin_success() {
        let registry = Arc::new(PackRegistry::new());
        registry
            .register_builtin_pack(BuiltinPack::new("builtin:test").with_tool(Arc::new(EchoInput)))
            .await
            .unwrap();
        let router = PackRouter::new(registry);

        let response = router.route_tool_call(call("echo")).await.unwrap();
        match response.outcome {
            ToolCallOutcome::Output(v) => assert_eq!(v["x"], 1),
            ToolCallOutcome::Error(e) => panic!("unexpected error: {e}"),
        }
    }

    #[tokio::test]
    async fn builtin_failure_is_a_tool_level_error() {
        let registry = Arc::new(PackRegistry::new());
        registry
            .register_builtin_pack(BuiltinPack::new("builtin:test").with_tool(Arc::new(AlwaysFails)))
            .await
            .unwrap();
        let router = PackRouter::new(registry);

        // The routing itself succeeds; the outcome carries the error.
        let response = router.route_tool_call(call("broken")).await.unwrap();
        assert!(matches!(response.outcome, ToolCallOutcome::Error(_)));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let router = PackRouter::new(Arc::new(PackRegistry::new()));
        let err = router.route_tool_call(call("missing")).await.unwrap_err();
        assert!(matches!(err, PackError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn external_calls_correlate_under_concurrency() {
        let (router, echo) = router_with_echo_pack().await;

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    let call = ToolCall {
                        request_id: RequestId::new(),
                        tool_name: "remote_echo".into(),
                        input: serde_json::json!({"i": i}),
                        agent_id: PrincipalId::new(),
                    };
                    let id = call.request_id;
                    let response = router.route_tool_call(call).await.unwrap();
                    assert_eq!(response.request_id, id);
                    match response.outcome {
                        ToolCallOutcome::Output(v) => assert_eq!(v["echoed"]["i"], i),
                        ToolCallOutcome::Error(e) => panic!("unexpected error: {e}"),
                    }
                })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }
        assert_eq!(router.pending_count().await, 0);
        echo.abort();
    }

    #[tokio::test]
    async fn duplicate_request_id_is_rejected() {
        let registry = Arc::new(PackRegistry::new());
        let manifest = PackManifest::new("p", "1.0.0")
            .with_tool(ToolDefinition::new("slow", "never responds"));
        let _rx = registry.register_pack(manifest).await.unwrap();
        let router = Arc::new(PackRouter::new(registry));

        let id = RequestId::new();
        let first = {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                let _ = router
                    .route_tool_call(ToolCall {
                        request_id: id,
                        tool_name: "slow".into(),
                        input: serde_json::json!({}),
                        agent_id: PrincipalId::new(),
                    })
                    .await;
            })
        };
        // Let the first call park itself in the pending table.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = router
            .route_tool_call(ToolCall {
                request_id: id,
                tool_name: "slow".into(),
                input: serde_json::json!({}),
                agent_id: PrincipalId::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PackError::DuplicateRequestId(_)));
        first.abort();
    }

    #[tokio::test]
    async fn per_tool_timeout_applies() {
        let registry = Arc::new(PackRegistry::new());
        let manifest = PackManifest::new("p", "1.0.0")
            .with_tool(ToolDefinition::new("slow", "never responds").with_timeout(1));
        let _rx = registry.register_pack(manifest).await.unwrap();
        let router = PackRouter::new(registry);

        let start = tokio::time::Instant::now();
        let err = router.route_tool_call(call("slow")).await.unwrap_err();
        assert!(matches!(err, PackError::Timeout { seconds: 1, .. }));
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert_eq!(router.pending_count().await, 0);
    }

    #[tokio::test]
    async fn closed_pack_surfaces_as_disconnected() {
        let registry = Arc::new(PackRegistry::new());
        let manifest =
            PackManifest::new("p", "1.0.0").with_tool(ToolDefinition::new("t", "tool"));
        let _rx = registry.register_pack(manifest).await.unwrap();
        let pack_id = PackId::from("p");
        registry.pack(&pack_id).await.unwrap().close().await;

        let router = PackRouter::new(registry);
        let err = router.route_tool_call(call("t")).await.unwrap_err();
        assert!(matches!(err, PackError::PackDisconnected));
        assert_eq!(router.pending_count().await, 0);
    }

    #[tokio::test]
    async fn fail_pack_wakes_waiters() {
        let registry = Arc::new(PackRegistry::new());
        let manifest = PackManifest::new("p", "1.0.0")
            .with_tool(ToolDefinition::new("slow", "never responds"));
        let _rx = registry.register_pack(manifest).await.unwrap();
        let router = Arc::new(PackRouter::new(registry));

        let waiter = {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.route_tool_call(call("slow")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(router.pending_count().await, 1);

        router.fail_pack(&PackId::from("p")).await;
        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, PackError::PackDisconnected));
        assert_eq!(router.pending_count().await, 0);
    }
}
