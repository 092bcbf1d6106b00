//! Server side of a pack's streaming attachment.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use waygate_core::id::PackId;

use crate::error::PackResult;
use crate::registry::PackRegistry;
use crate::router::PackRouter;
use crate::types::{ExecuteToolRequest, PackManifest, ToolResponse};

/// Accepts pack attachments and shuttles tool traffic over them.
///
/// A pack attaches by delivering its manifest once; the gateway then
/// pushes `ExecuteToolRequest` frames down the stream and the pack
/// answers through [`tool_result`](Self::tool_result). The transport is
/// a collaborator: it hands in the sending half of the stream and keeps
/// the receiving half alive for as long as the pack is connected.
pub struct PackAttachmentService {
    registry: Arc<PackRegistry>,
    router: Arc<PackRouter>,
}

impl PackAttachmentService {
    /// Create the service.
    #[must_use]
    pub fn new(registry: Arc<PackRegistry>, router: Arc<PackRouter>) -> Self {
        Self { registry, router }
    }

    /// Serve one pack attachment until its stream ends.
    ///
    /// Registers the pack, then drains its request queue onto `outgoing`.
    /// Returns once the transport drops the stream (or the registry
    /// closes the queue), after unregistering the pack and failing its
    /// outstanding calls.
    ///
    /// # Errors
    ///
    /// Registration errors (`PackAlreadyRegistered`, `ToolCollision`)
    /// reject the attachment before any traffic flows.
    pub async fn attach(
        &self,
        manifest: PackManifest,
        outgoing: mpsc::Sender<ExecuteToolRequest>,
    ) -> PackResult<()> {
        let pack_id = manifest.pack_id.clone();
        let mut queue = self.registry.register_pack(manifest).await?;
        info!(pack = %pack_id, "Pack attached");

        loop {
            tokio::select! {
                request = queue.recv() => match request {
                    Some(request) => {
                        debug!(pack = %pack_id, request = %request.request_id, "Forwarding tool request");
                        if outgoing.send(request).await.is_err() {
                            break;
                        }
                    },
                    // Queue closed by unregister/shutdown.
                    None => break,
                },
                () = outgoing.closed() => break,
            }
        }

        self.detach(&pack_id).await;
        Ok(())
    }

    /// Tear one pack down: unregister it and fail its pending calls.
    pub async fn detach(&self, pack_id: &PackId) {
        self.registry.unregister_pack(pack_id).await;
        self.router.fail_pack(pack_id).await;
        info!(pack = %pack_id, "Pack detached");
    }

    /// Deliver a pack's tool result to the waiting caller.
    pub async fn tool_result(&self, response: ToolResponse) {
        self.router.handle_tool_response(response).await;
    }
}

impl std::fmt::Debug for PackAttachmentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackAttachmentService").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PackError;
    use crate::router::ToolCall;
    use crate::types::ToolDefinition;
    use std::time::Duration;
    use waygate_core::id::{PrincipalId, RequestId};
    use waygate_core::protocol::ToolCallOutcome;

    fn service() -> (Arc<PackAttachmentService>, Arc<PackRouter>) {
        let registry = Arc::new(PackRegistry::new());
        let router = Arc::new(PackRouter::new(Arc::clone(&registry)));
        (
            Arc::new(PackAttachmentService::new(registry, Arc::clone(&router))),
            router,
        )
    }

    #[tokio::test]
    async fn requests_flow_to_the_stream_and_results_flow_back() {
        let (service, router) = service();
        let manifest = PackManifest::new("p", "1.0.0")
            .with_tool(ToolDefinition::new("double", "doubles x"));
        let (stream_tx, mut stream_rx) = mpsc::channel::<ExecuteToolRequest>(4);

        let attachment = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.attach(manifest, stream_tx).await })
        };

        // The "pack process": read one request, answer it.
        let pack_side = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                let req = stream_rx.recv().await.expect("request reaches the pack");
                let x = req.input["x"].as_i64().unwrap_or(0);
                service
                    .tool_result(ToolResponse::output(
                        req.request_id,
                        serde_json::json!({"doubled": x.saturating_mul(2)}),
                    ))
                    .await;
                stream_rx
            })
        };

        let response = router
            .route_tool_call(ToolCall {
                request_id: RequestId::new(),
                tool_name: "double".into(),
                input: serde_json::json!({"x": 21}),
                agent_id: PrincipalId::new(),
            })
            .await
            .unwrap();
        match response.outcome {
            ToolCallOutcome::Output(v) => assert_eq!(v["doubled"], 42),
            ToolCallOutcome::Error(e) => panic!("unexpected error: {e}"),
        }

        // Dropping the pack's receiver ends the attachment.
        let stream_rx = pack_side.await.unwrap();
        drop(stream_rx);
        attachment.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stream_death_fails_outstanding_calls() {
        let (service, router) = service();
        let manifest =
            PackManifest::new("p", "1.0.0").with_tool(ToolDefinition::new("slow", "stalls"));
        let (stream_tx, stream_rx) = mpsc::channel::<ExecuteToolRequest>(4);

        let attachment = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.attach(manifest, stream_tx).await })
        };

        let waiter = {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                router
                    .route_tool_call(ToolCall {
                        request_id: RequestId::new(),
                        tool_name: "slow".into(),
                        input: serde_json::json!({}),
                        agent_id: PrincipalId::new(),
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The pack dies without answering.
        drop(stream_rx);
        attachment.await.unwrap().unwrap();

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, PackError::PackDisconnected));
        assert_eq!(router.pending_count().await, 0);
        assert!(router.registry().list_packs().await.is_empty());
    }

    #[tokio::test]
    async fn rejected_manifest_never_attaches() {
        let (service, _router) = service();
        let (tx_a, _rx_a) = mpsc::channel(4);
        let (tx_b, _rx_b) = mpsc::channel(4);

        let manifest_a =
            PackManifest::new("a", "1.0.0").with_tool(ToolDefinition::new("search", "s"));
        let a = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.attach(manifest_a, tx_a).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let manifest_b = PackManifest::new("b", "1.0.0")
            .with_tool(ToolDefinition::new("search", "s"))
            .with_tool(ToolDefinition::new("summarize", "s"));
        let err = service.attach(manifest_b, tx_b).await.unwrap_err();
        assert!(matches!(err, PackError::ToolCollision(_)));
        assert!(service.registry.tool_by_name("summarize").await.is_none());

        a.abort();
    }
}
