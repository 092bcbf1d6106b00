//! Scripted agent and pack harnesses.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use waygate_core::capability::CapabilitySet;
use waygate_core::id::{PrincipalId, QuestionId, RequestId};
use waygate_core::protocol::{
    AgentEvent, AgentFrame, GatewayFrame, QuestionAnswer, Registration,
};
use waygate_gateway::{AgentConnection, Gateway};
use waygate_packs::{ExecuteToolRequest, PackManifest, ToolResponse};

/// A scripted agent attached over in-process channels.
///
/// The test drives both ends: push frames with the `send_*` helpers,
/// read the gateway's frames with [`recv`](Self::recv). Dropping the
/// harness (or calling [`disconnect`](Self::disconnect)) ends the
/// stream, which sends the connection into its grace period.
pub struct TestAgent {
    /// The agent's principal.
    pub principal: PrincipalId,
    /// The live connection inside the gateway.
    pub connection: Arc<AgentConnection>,
    frames_in: mpsc::Sender<AgentFrame>,
    frames_out: mpsc::Receiver<GatewayFrame>,
}

impl TestAgent {
    /// Attach a fresh agent with capabilities `{base}`.
    ///
    /// # Panics
    ///
    /// Panics if the attachment is rejected or the welcome never
    /// arrives; tests want that loud.
    pub async fn attach(gateway: &Gateway, instance: &str, working_dir: &str) -> Self {
        Self::attach_with(
            gateway,
            PrincipalId::new(),
            instance,
            working_dir,
            CapabilitySet::from_names(["base"]),
        )
        .await
    }

    /// Attach with a specific principal and capability set.
    ///
    /// # Panics
    ///
    /// Panics if the attachment is rejected or the welcome never
    /// arrives.
    pub async fn attach_with(
        gateway: &Gateway,
        principal: PrincipalId,
        instance: &str,
        working_dir: &str,
        capabilities: CapabilitySet,
    ) -> Self {
        let (in_tx, in_rx) = mpsc::channel(32);
        let (out_tx, mut out_rx) = mpsc::channel(32);
        in_tx
            .send(AgentFrame::Register(Registration {
                principal,
                instance_id: instance.to_string(),
                name: format!("test-agent-{instance}"),
                capabilities,
                workspaces: vec!["default".to_string()],
                working_dir: working_dir.to_string(),
            }))
            .await
            .expect("register frame accepted");

        let connection = gateway
            .attach_agent(in_rx, out_tx)
            .await
            .expect("attachment accepted");

        match out_rx.recv().await {
            Some(GatewayFrame::Welcome { connection_id }) => {
                assert_eq!(connection_id, connection.id(), "welcome carries our id");
            },
            other => panic!("expected welcome, got {other:?}"),
        }

        Self {
            principal,
            connection,
            frames_in: in_tx,
            frames_out: out_rx,
        }
    }

    /// Next frame from the gateway.
    pub async fn recv(&mut self) -> Option<GatewayFrame> {
        self.frames_out.recv().await
    }

    /// Wait for a `SendMessage` frame, panicking on anything else.
    ///
    /// # Panics
    ///
    /// Panics when the stream ends or yields a different frame.
    pub async fn expect_send_message(&mut self) -> (RequestId, String) {
        match self.recv().await {
            Some(GatewayFrame::SendMessage {
                request_id,
                content,
                ..
            }) => (request_id, content),
            other => panic!("expected send_message, got {other:?}"),
        }
    }

    /// Push a heartbeat.
    pub async fn heartbeat(&self) {
        let _ = self.frames_in.send(AgentFrame::Heartbeat).await;
    }

    /// Push one response event for a request.
    pub async fn respond(&self, request_id: RequestId, event: AgentEvent) {
        let _ = self
            .frames_in
            .send(AgentFrame::MessageResponse { request_id, event })
            .await;
    }

    /// Respond with a text event followed by the terminal `done`.
    pub async fn respond_text_done(&self, request_id: RequestId, text: &str) {
        self.respond(request_id, AgentEvent::text(text)).await;
        self.respond(request_id, AgentEvent::done()).await;
    }

    /// Push a tool call request.
    pub async fn call_tool(&self, request_id: RequestId, tool: &str, input: serde_json::Value) {
        let _ = self
            .frames_in
            .send(AgentFrame::ToolCallRequest {
                request_id,
                tool_name: tool.to_string(),
                input,
            })
            .await;
    }

    /// Relay a user's answer to a question.
    pub async fn answer_question(&self, question_id: QuestionId, answer: QuestionAnswer) {
        let _ = self
            .frames_in
            .send(AgentFrame::UserQuestionAnswer {
                question_id,
                answer,
            })
            .await;
    }

    /// End the agent's stream.
    pub fn disconnect(self) {
        drop(self.frames_in);
    }
}

impl std::fmt::Debug for TestAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestAgent")
            .field("principal", &self.principal)
            .field("connection", &self.connection.id())
            .finish()
    }
}

/// A scripted external pack attached to a gateway.
///
/// The attachment task runs in the background; the test reads incoming
/// tool requests from [`requests`](Self::requests) and answers through
/// the gateway. [`spawn_echo`](Self::spawn_echo) installs an automatic
/// responder instead.
pub struct TestPack {
    /// Tool requests the gateway forwards to this pack.
    pub requests: mpsc::Receiver<ExecuteToolRequest>,
    attachment: JoinHandle<()>,
}

impl TestPack {
    /// Attach a pack; panics if the manifest is rejected.
    ///
    /// # Panics
    ///
    /// Panics when registration fails (duplicate pack id or tool
    /// collision) or never lands.
    pub async fn attach(gateway: &Arc<Gateway>, manifest: PackManifest) -> Self {
        let pack_id = manifest.pack_id.clone();
        let (tx, rx) = mpsc::channel(32);
        let attachment = {
            let gateway = Arc::clone(gateway);
            tokio::spawn(async move {
                // attach() serves until the stream ends; a registration
                // failure returns immediately, which the poll below sees
                // as the task finishing without the pack appearing.
                let _ = gateway.attach_pack(manifest, tx).await;
            })
        };

        for _ in 0..200 {
            if gateway.registry().pack(&pack_id).await.is_some() {
                return Self {
                    requests: rx,
                    attachment,
                };
            }
            if attachment.is_finished() {
                panic!("pack attachment rejected");
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        panic!("pack {pack_id} never registered");
    }

    /// Attach a pack that echoes every request's input back as output.
    pub async fn spawn_echo(
        gateway: &Arc<Gateway>,
        manifest: PackManifest,
    ) -> JoinHandle<()> {
        let mut pack = Self::attach(gateway, manifest).await;
        let gateway = Arc::clone(gateway);
        tokio::spawn(async move {
            while let Some(request) = pack.requests.recv().await {
                gateway
                    .tool_result(ToolResponse::output(
                        request.request_id,
                        serde_json::json!({"echoed": request.input}),
                    ))
                    .await;
            }
        })
    }

    /// Kill the pack's attachment stream.
    pub fn disconnect(self) {
        drop(self.requests);
        // The attachment task notices the closed stream and unregisters.
        let _ = self.attachment;
    }
}

impl std::fmt::Debug for TestPack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestPack").finish_non_exhaustive()
    }
}
