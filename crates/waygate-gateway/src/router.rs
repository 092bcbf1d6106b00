//! Message routing between clients and agents.
//!
//! `send_message` resolves the target agent, journals the inbound
//! message, forwards it over the agent's stream, and returns a channel
//! of the agent's response events. A per-request pump worker tees every
//! response event three ways: into the ledger, onto the broadcaster,
//! and to the caller.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use waygate_core::auth::AuthContext;
use waygate_core::id::{ConnectionId, ConversationKey, EventId, PrincipalId, QuestionId, RequestId, ThreadId};
use waygate_core::protocol::{GatewayFrame, QuestionAnswer};
use waygate_events::{Broadcaster, Direction, LedgerEvent};
use waygate_packs::{QuestionRouter, UserQuestion};
use waygate_storage::{Store, Thread};

use crate::config::GatewayConfig;
use crate::connection::AgentConnection;
use crate::dedupe::{DedupeCache, DedupeEntry};
use crate::error::{GatewayError, GatewayResult};
use crate::manager::AgentManager;

/// One client send.
#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    /// Frontend name (e.g. `"web"`).
    pub frontend: String,
    /// Channel id within that frontend; resolved through the binding
    /// store unless `connection_id` targets an agent directly.
    pub channel_id: String,
    /// External conversation id for thread resolution; defaults to the
    /// channel id.
    pub external_id: Option<String>,
    /// Target a specific live connection, bypassing binding resolution.
    pub connection_id: Option<ConnectionId>,
    /// Display name of the sending user.
    pub sender: String,
    /// Message content.
    pub content: String,
    /// Client-supplied idempotency key.
    pub dedupe_key: Option<String>,
}

/// The caller's handle on one routed send.
pub struct SendHandle {
    /// The resolved thread.
    pub thread_id: ThreadId,
    /// The conversation the send journals under.
    pub conversation_key: ConversationKey,
    /// The request id correlating the response stream.
    pub request_id: RequestId,
    /// The agent's response events; closes after the terminal event.
    pub events: mpsc::Receiver<Arc<LedgerEvent>>,
}

impl std::fmt::Debug for SendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendHandle")
            .field("thread_id", &self.thread_id)
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

/// Routes client messages to agents and response streams back.
pub struct MessageRouter {
    store: Arc<dyn Store>,
    broadcaster: Broadcaster,
    manager: Arc<AgentManager>,
    questions: Arc<QuestionRouter>,
    dedupe: Arc<DedupeCache>,
    config: GatewayConfig,
}

impl MessageRouter {
    /// Create a router over its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        broadcaster: Broadcaster,
        manager: Arc<AgentManager>,
        questions: Arc<QuestionRouter>,
        dedupe: Arc<DedupeCache>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            store,
            broadcaster,
            manager,
            questions,
            dedupe,
            config,
        }
    }

    /// Send a message to an agent and stream its response back.
    ///
    /// # Errors
    ///
    /// [`GatewayError::ChannelNotBound`] when no binding exists,
    /// [`GatewayError::AgentUnavailable`] when no ready connection holds
    /// the bound identity, [`GatewayError::Validation`] on empty content,
    /// plus storage errors.
    pub async fn send_message(
        &self,
        auth: &AuthContext,
        request: SendMessageRequest,
    ) -> GatewayResult<SendHandle> {
        if request.content.trim().is_empty() {
            return Err(GatewayError::Validation("content must not be empty".into()));
        }

        // An idempotent retry replays the original send.
        if let Some(key) = &request.dedupe_key {
            if let Some(entry) = self.dedupe.get(key).await {
                debug!(dedupe_key = %key, request = %entry.request_id(), "Dedupe hit, replaying");
                return Ok(SendHandle {
                    thread_id: entry.thread_id(),
                    conversation_key: entry.conversation_key().clone(),
                    request_id: entry.request_id(),
                    events: entry.attach_listener(self.config.fanout_capacity),
                });
            }
        }

        let conn = self.resolve_connection(&request).await?;
        let external_id = request
            .external_id
            .clone()
            .unwrap_or_else(|| request.channel_id.clone());
        let thread = self
            .resolve_thread(&request.frontend, &external_id, conn.principal())
            .await?;
        let conversation_key = thread.conversation_key();
        let request_id = RequestId::new();

        // Journal the inbound message before it reaches the agent. An
        // append failure is logged, not fatal: the store is expected to
        // be durable, and the send is already committed from the
        // caller's point of view.
        let inbound = Arc::new(
            LedgerEvent::message(
                conversation_key.clone(),
                Direction::InboundToAgent,
                &request.sender,
                &request.content,
            )
            .with_actor(auth.principal_id)
            .with_request(request_id),
        );
        if let Err(err) = self.store.save_event(&inbound).await {
            error!(error = %err, "Inbound ledger append failed");
        }
        self.broadcaster.publish_arc(&inbound);

        let raw_rx = conn
            .register_fanout(request_id, self.config.fanout_capacity)
            .await;
        if let Err(err) = conn
            .send(GatewayFrame::SendMessage {
                request_id,
                thread_id: thread.id,
                content: request.content.clone(),
            })
            .await
        {
            conn.remove_fanout(request_id).await;
            return Err(err);
        }

        let entry = Arc::new(DedupeEntry::new(
            thread.id,
            conversation_key.clone(),
            request_id,
        ));
        if let Some(key) = &request.dedupe_key {
            self.dedupe.insert(key.clone(), Arc::clone(&entry)).await;
        }

        let (caller_tx, caller_rx) = mpsc::channel(self.config.fanout_capacity.max(1));
        tokio::spawn(
            Pump {
                store: Arc::clone(&self.store),
                broadcaster: self.broadcaster.clone(),
                conn: Arc::clone(&conn),
                entry,
                conversation_key: conversation_key.clone(),
                author: conn.name().to_string(),
                request_id,
                caller_tx,
            }
            .run(raw_rx),
        );

        Ok(SendHandle {
            thread_id: thread.id,
            conversation_key,
            request_id,
            events: caller_rx,
        })
    }

    /// Replay a conversation's history, then tail it live.
    ///
    /// With `since`, replay starts after that event; without it, the
    /// most recent `replay_limit` events are replayed. The seam between
    /// replay and tail is deduplicated by event id.
    ///
    /// # Errors
    ///
    /// Storage errors from the history read.
    pub async fn stream_events(
        &self,
        key: &ConversationKey,
        since: Option<EventId>,
    ) -> GatewayResult<mpsc::Receiver<Arc<LedgerEvent>>> {
        // Subscribe before reading history so no event can fall between.
        let mut live = self.broadcaster.subscribe(key);

        let mut history: Vec<LedgerEvent> = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .store
                .get_events(key, cursor.as_deref(), self.config.replay_limit)
                .await?;
            history.extend(page.events);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        let history = match since {
            Some(since_id) => match history.iter().position(|e| e.id == since_id) {
                Some(pos) => history.split_off(pos.saturating_add(1)),
                // Unknown resume point: replay everything we have.
                None => history,
            },
            None => {
                let skip = history.len().saturating_sub(self.config.replay_limit);
                history.split_off(skip)
            },
        };

        let capacity = self.config.subscriber_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        tokio::spawn(async move {
            let mut replayed: HashSet<EventId> = HashSet::new();
            for event in history {
                replayed.insert(event.id);
                if tx.send(Arc::new(event)).await.is_err() {
                    return;
                }
            }
            while let Some(event) = live.recv().await {
                if replayed.contains(&event.id) {
                    continue;
                }
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }

    /// Deliver a client's answer to a pending `ask_user` question.
    ///
    /// # Errors
    ///
    /// `QuestionNotFound` when the question expired or never existed;
    /// `Validation` when the agent id does not match.
    pub async fn answer_question(
        &self,
        agent_id: PrincipalId,
        question_id: QuestionId,
        answer: QuestionAnswer,
    ) -> GatewayResult<()> {
        self.questions
            .deliver_answer(agent_id, question_id, answer)
            .await
            .map_err(GatewayError::from)
    }

    /// Subscribe to the questions an agent asks.
    pub async fn subscribe_questions(
        &self,
        agent_id: PrincipalId,
    ) -> mpsc::Receiver<UserQuestion> {
        self.questions.subscribe(agent_id).await
    }

    async fn resolve_connection(
        &self,
        request: &SendMessageRequest,
    ) -> GatewayResult<Arc<AgentConnection>> {
        if let Some(id) = request.connection_id {
            return self
                .manager
                .agent(id)
                .await
                .filter(|c| c.is_ready(self.config.heartbeat_timeout()))
                .ok_or_else(|| GatewayError::AgentUnavailable(id.to_string()));
        }

        let binding = self
            .store
            .find_binding(&request.frontend, &request.channel_id)
            .await?
            .ok_or_else(|| GatewayError::ChannelNotBound {
                frontend: request.frontend.clone(),
                channel_id: request.channel_id.clone(),
            })?;
        self.manager
            .by_principal_and_workdir(binding.principal_id, &binding.working_dir)
            .await
            .ok_or_else(|| {
                GatewayError::AgentUnavailable(format!(
                    "{} at {}",
                    binding.principal_id, binding.working_dir
                ))
            })
    }

    async fn resolve_thread(
        &self,
        frontend: &str,
        external_id: &str,
        agent: PrincipalId,
    ) -> GatewayResult<Thread> {
        if let Some(thread) = self.store.find_thread(frontend, external_id).await? {
            if let Err(err) = self.store.touch_thread(thread.id).await {
                debug!(error = %err, "Thread touch failed");
            }
            return Ok(thread);
        }

        let thread = Thread::new(frontend, external_id, agent);
        match self.store.create_thread(&thread).await {
            Ok(()) => Ok(thread),
            Err(err) if err.is_duplicate_thread() => {
                // Lost a create race; the winner's row is authoritative.
                self.store
                    .find_thread(frontend, external_id)
                    .await?
                    .ok_or_else(|| {
                        GatewayError::NotFound(format!("thread ({frontend}, {external_id})"))
                    })
            },
            Err(err) => Err(err.into()),
        }
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter").finish_non_exhaustive()
    }
}

/// Per-request worker teeing response events to ledger, broadcaster,
/// dedupe entry, and caller.
struct Pump {
    store: Arc<dyn Store>,
    broadcaster: Broadcaster,
    conn: Arc<AgentConnection>,
    entry: Arc<DedupeEntry>,
    conversation_key: ConversationKey,
    author: String,
    request_id: RequestId,
    caller_tx: mpsc::Sender<Arc<LedgerEvent>>,
}

impl Pump {
    async fn run(self, mut raw_rx: mpsc::Receiver<waygate_core::protocol::AgentEvent>) {
        loop {
            match raw_rx.recv().await {
                Some(event) => {
                    let terminal = event.is_terminal();
                    let ledger = Arc::new(LedgerEvent::from_agent_event(
                        self.conversation_key.clone(),
                        &self.author,
                        self.request_id,
                        &event,
                    ));
                    self.journal(&ledger).await;
                    if self.caller_tx.send(Arc::clone(&ledger)).await.is_err() {
                        // The caller walked away mid-response.
                        self.append_error("response cancelled by caller").await;
                        break;
                    }
                    if terminal {
                        break;
                    }
                },
                None => {
                    // Stream or connection died before the terminal event.
                    warn!(
                        request = %self.request_id,
                        connection = %self.conn.id(),
                        "Agent stream closed before response completed"
                    );
                    self.append_error("agent stream closed before response completed")
                        .await;
                    break;
                },
            }
        }
        self.conn.remove_fanout(self.request_id).await;
        self.entry.finish();
    }

    async fn journal(&self, event: &Arc<LedgerEvent>) {
        if let Err(err) = self.store.save_event(event).await {
            // The response still reaches the caller.
            error!(error = %err, event = %event.id, "Outbound ledger append failed");
        }
        self.broadcaster.publish_arc(event);
        self.entry.record(event);
    }

    async fn append_error(&self, reason: &str) {
        let event = Arc::new(
            LedgerEvent::error(
                self.conversation_key.clone(),
                Direction::OutboundFromAgent,
                "gateway",
                reason,
            )
            .with_request(self.request_id),
        );
        self.journal(&event).await;
        // Best effort; the caller is usually gone on this path.
        let _ = self.caller_tx.try_send(event);
    }
}
