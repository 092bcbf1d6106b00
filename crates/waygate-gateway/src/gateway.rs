//! Gateway assembly — constructs and wires the core singletons.

use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use waygate_core::auth::AuthContext;
use waygate_core::capability::CapabilitySet;
use waygate_core::id::{ConversationKey, EventId, PrincipalId, QuestionId};
use waygate_core::protocol::{AgentFrame, GatewayFrame, QuestionAnswer};
use waygate_events::{Broadcaster, LedgerEvent};
use waygate_packs::{
    AgentDirectory, ExecuteToolRequest, PackAttachmentService, PackManifest, PackRegistry,
    PackRouter, QuestionRouter, ToolDefinition, ToolResponse, UserQuestion, base_pack,
};
use waygate_storage::Store;

use crate::config::GatewayConfig;
use crate::connection::AgentConnection;
use crate::dedupe::DedupeCache;
use crate::error::GatewayResult;
use crate::manager::AgentManager;
use crate::router::{MessageRouter, SendHandle, SendMessageRequest};

/// Point-in-time snapshot of gateway load.
#[derive(Debug, Clone)]
pub struct GatewayStats {
    /// Connections currently ready to receive messages.
    pub ready_agents: usize,
    /// All tracked connections including grace-period ones.
    pub tracked_connections: usize,
    /// Live external packs.
    pub live_packs: usize,
    /// Registered tools, builtin plus external.
    pub registered_tools: usize,
    /// In-flight external tool calls.
    pub pending_tool_calls: usize,
    /// Questions awaiting a client answer.
    pub pending_questions: usize,
    /// Live broadcast subscriptions.
    pub subscriptions: usize,
    /// Cached dedupe entries.
    pub dedupe_entries: usize,
}

/// The assembled control-plane gateway.
///
/// Owns the process-wide singletons (pack registry, agent manager,
/// broadcaster, question router, dedupe cache), wires them together from
/// a [`GatewayConfig`], and exposes the client API the out-of-scope
/// HTTP/SSE façade consumes. Tests construct independent gateways
/// freely.
pub struct Gateway {
    config: GatewayConfig,
    store: Arc<dyn Store>,
    broadcaster: Broadcaster,
    registry: Arc<PackRegistry>,
    pack_router: Arc<PackRouter>,
    attachments: Arc<PackAttachmentService>,
    questions: Arc<QuestionRouter>,
    manager: Arc<AgentManager>,
    router: Arc<MessageRouter>,
    dedupe: Arc<DedupeCache>,
    background: StdMutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Gateway {
    /// Construct a gateway over a store, register the builtin base pack,
    /// and start the background tasks (heartbeat reaper, dedupe
    /// sweeper).
    ///
    /// # Errors
    ///
    /// Builtin pack registration errors (only possible if the builtin
    /// tool set itself collides, which would be a bug).
    pub async fn new(config: GatewayConfig, store: Arc<dyn Store>) -> GatewayResult<Self> {
        let broadcaster = Broadcaster::with_capacity(config.subscriber_capacity);
        let registry = Arc::new(PackRegistry::with_queue_capacity(config.pack_queue_capacity));
        let pack_router = Arc::new(PackRouter::with_default_timeout(
            Arc::clone(&registry),
            config.tool_timeout(),
        ));
        let attachments = Arc::new(PackAttachmentService::new(
            Arc::clone(&registry),
            Arc::clone(&pack_router),
        ));
        let questions = Arc::new(QuestionRouter::new());
        let manager = Arc::new(AgentManager::new(
            config.clone(),
            Arc::clone(&pack_router),
            Arc::clone(&questions),
        ));
        let dedupe = Arc::new(DedupeCache::new(config.dedupe_ttl()));
        let router = Arc::new(MessageRouter::new(
            Arc::clone(&store),
            broadcaster.clone(),
            Arc::clone(&manager),
            Arc::clone(&questions),
            Arc::clone(&dedupe),
            config.clone(),
        ));

        registry
            .register_builtin_pack(base_pack(
                Arc::clone(&store),
                Arc::clone(&questions),
                Arc::clone(&manager) as Arc<dyn AgentDirectory>,
            ))
            .await?;

        let background = vec![
            manager.spawn_reaper(),
            dedupe.spawn_sweeper(config.dedupe_sweep()),
        ];

        info!("Gateway assembled");
        Ok(Self {
            config,
            store,
            broadcaster,
            registry,
            pack_router,
            attachments,
            questions,
            manager,
            router,
            dedupe,
            background: StdMutex::new(background),
            closed: AtomicBool::new(false),
        })
    }

    // --- Client API ---------------------------------------------------------

    /// Send a message to an agent; see [`MessageRouter::send_message`].
    ///
    /// # Errors
    ///
    /// See [`MessageRouter::send_message`].
    pub async fn send_message(
        &self,
        auth: &AuthContext,
        request: SendMessageRequest,
    ) -> GatewayResult<SendHandle> {
        self.router.send_message(auth, request).await
    }

    /// Replay-then-tail a conversation's events.
    ///
    /// # Errors
    ///
    /// See [`MessageRouter::stream_events`].
    pub async fn stream_events(
        &self,
        key: &ConversationKey,
        since: Option<EventId>,
    ) -> GatewayResult<mpsc::Receiver<Arc<LedgerEvent>>> {
        self.router.stream_events(key, since).await
    }

    /// Answer a pending `ask_user` question.
    ///
    /// # Errors
    ///
    /// See [`MessageRouter::answer_question`].
    pub async fn answer_question(
        &self,
        agent_id: PrincipalId,
        question_id: QuestionId,
        answer: QuestionAnswer,
    ) -> GatewayResult<()> {
        self.router.answer_question(agent_id, question_id, answer).await
    }

    /// Subscribe to the questions an agent asks.
    pub async fn subscribe_questions(
        &self,
        agent_id: PrincipalId,
    ) -> mpsc::Receiver<UserQuestion> {
        self.router.subscribe_questions(agent_id).await
    }

    // --- Attachments --------------------------------------------------------

    /// Accept an agent attachment; see [`AgentManager::attach`].
    ///
    /// # Errors
    ///
    /// See [`AgentManager::attach`].
    pub async fn attach_agent(
        &self,
        incoming: mpsc::Receiver<AgentFrame>,
        outgoing: mpsc::Sender<GatewayFrame>,
    ) -> GatewayResult<Arc<AgentConnection>> {
        self.manager.attach(incoming, outgoing).await
    }

    /// Serve a pack attachment until its stream ends; see
    /// [`PackAttachmentService::attach`].
    ///
    /// # Errors
    ///
    /// See [`PackAttachmentService::attach`].
    pub async fn attach_pack(
        &self,
        manifest: PackManifest,
        outgoing: mpsc::Sender<ExecuteToolRequest>,
    ) -> GatewayResult<()> {
        self.attachments.attach(manifest, outgoing).await?;
        Ok(())
    }

    /// Deliver a pack's tool result.
    pub async fn tool_result(&self, response: ToolResponse) {
        self.attachments.tool_result(response).await;
    }

    // --- Discovery & introspection ------------------------------------------

    /// Every tool visible to an agent declaring `caps`.
    pub async fn tools_for_capabilities(&self, caps: &CapabilitySet) -> Vec<ToolDefinition> {
        self.registry.tools_for_capabilities(caps).await
    }

    /// Point-in-time load snapshot.
    pub async fn stats(&self) -> GatewayStats {
        GatewayStats {
            ready_agents: self.manager.list_agents().await.len(),
            tracked_connections: self.manager.connection_count().await,
            live_packs: self.registry.list_packs().await.len(),
            registered_tools: self.registry.tool_count().await,
            pending_tool_calls: self.pack_router.pending_count().await,
            pending_questions: self.questions.pending_count().await,
            subscriptions: self.broadcaster.subscriber_count(),
            dedupe_entries: self.dedupe.len().await,
        }
    }

    /// The agent connection manager.
    #[must_use]
    pub fn manager(&self) -> &Arc<AgentManager> {
        &self.manager
    }

    /// The pack registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<PackRegistry> {
        &self.registry
    }

    /// The pack router.
    #[must_use]
    pub fn pack_router(&self) -> &Arc<PackRouter> {
        &self.pack_router
    }

    /// The live broadcast fabric.
    #[must_use]
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    // --- Lifecycle ----------------------------------------------------------

    /// Shut the gateway down: stop background tasks, tear down every
    /// connection and pack, fail pending calls and questions, and close
    /// the broadcaster. Idempotent.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Gateway shutting down");
        let tasks: Vec<JoinHandle<()>> = match self.background.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for task in tasks {
            task.abort();
        }
        self.manager.close().await;
        self.registry.close().await;
        self.pack_router.close().await;
        self.questions.close().await;
        self.broadcaster.close();
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
