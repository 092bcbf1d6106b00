//! Agent connection lifecycle and addressing.
//!
//! # Lifecycle
//!
//! A connection is born when a stream's first frame is a valid
//! `Register`, stays `Ready` while heartbeats arrive, and dies when the
//! stream ends and the reconnect grace period passes. A stale heartbeat
//! excludes a connection from every lookup immediately; full removal
//! waits for the reaper.
//!
//! # Addressing
//!
//! `(principal, working_dir)` names a logical agent identity. At most
//! one connection holds an identity: a newer attachment displaces the
//! older one (which enables fast client reconnect, at the cost of
//! silently displacing a zombie process — hence the warning).
//!
//! # Locking
//!
//! One RwLock guards the three connection indexes. It is never held
//! across stream I/O; displacement teardown awaits only the displaced
//! connection's own close-mutex.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use waygate_core::id::{ConnectionId, InstanceId, PrincipalId};
use waygate_core::protocol::{AgentFrame, GatewayFrame, Registration, ToolCallOutcome};
use waygate_packs::{AgentDirectory, AgentSummary, PackRouter, QuestionRouter, ToolCall};

use crate::config::GatewayConfig;
use crate::connection::{AgentConnection, ConnectionState};
use crate::error::{GatewayError, GatewayResult};

#[derive(Default)]
struct ManagerInner {
    by_id: HashMap<ConnectionId, Arc<AgentConnection>>,
    by_addr: HashMap<(PrincipalId, String), ConnectionId>,
    by_instance: HashMap<InstanceId, ConnectionId>,
}

/// Owns every live agent connection and its read/write tasks.
pub struct AgentManager {
    inner: RwLock<ManagerInner>,
    config: GatewayConfig,
    pack_router: Arc<PackRouter>,
    questions: Arc<QuestionRouter>,
}

impl AgentManager {
    /// Create a manager.
    #[must_use]
    pub fn new(
        config: GatewayConfig,
        pack_router: Arc<PackRouter>,
        questions: Arc<QuestionRouter>,
    ) -> Self {
        Self {
            inner: RwLock::new(ManagerInner::default()),
            config,
            pack_router,
            questions,
        }
    }

    /// Accept one agent attachment.
    ///
    /// Waits for the stream's `Register` frame, validates it, displaces
    /// any previous holder of the `(principal, working_dir)` identity,
    /// queues a `Welcome`, and spawns the connection's read and write
    /// tasks. Returns the live connection.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidRegistration`] if the first frame is
    /// missing, late, or malformed.
    pub async fn attach(
        self: &Arc<Self>,
        mut incoming: mpsc::Receiver<AgentFrame>,
        outgoing: mpsc::Sender<GatewayFrame>,
    ) -> GatewayResult<Arc<AgentConnection>> {
        let first = tokio::time::timeout(self.config.registration_timeout(), incoming.recv())
            .await
            .map_err(|_| {
                GatewayError::InvalidRegistration("no register frame before deadline".into())
            })?
            .ok_or_else(|| {
                GatewayError::InvalidRegistration("stream ended before register".into())
            })?;
        let AgentFrame::Register(registration) = first else {
            return Err(GatewayError::InvalidRegistration(
                "first frame must be register".into(),
            ));
        };
        validate_registration(&registration)?;

        let (conn, queue_rx) =
            AgentConnection::new(registration, self.config.agent_queue_capacity);
        let conn = Arc::new(conn);

        let displaced = {
            let mut inner = self.inner.write().await;
            let addr = (conn.principal(), conn.working_dir().to_string());
            let prev = inner
                .by_addr
                .insert(addr, conn.id())
                .and_then(|prev_id| inner.by_id.remove(&prev_id));
            if let Some(prev) = &prev {
                inner.by_instance.remove(prev.instance_id());
            }
            inner.by_id.insert(conn.id(), Arc::clone(&conn));
            inner
                .by_instance
                .insert(conn.instance_id().clone(), conn.id());
            prev
        };
        if let Some(prev) = displaced {
            warn!(
                principal = %conn.principal(),
                working_dir = %conn.working_dir(),
                old = %prev.id(),
                new = %conn.id(),
                "Displacing previous connection for agent identity"
            );
            prev.set_state(ConnectionState::Displaced);
            prev.close_outbound().await;
            prev.close_fanout().await;
        }

        conn.send(GatewayFrame::Welcome {
            connection_id: conn.id(),
        })
        .await?;

        tokio::spawn(run_writer(conn.id(), queue_rx, outgoing));
        {
            let manager = Arc::clone(self);
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { manager.run_reader(conn, incoming).await });
        }

        info!(
            connection = %conn.id(),
            principal = %conn.principal(),
            instance = %conn.instance_id(),
            name = %conn.name(),
            working_dir = %conn.working_dir(),
            "Agent attached"
        );
        Ok(conn)
    }

    /// A connection by id, in any state.
    pub async fn agent(&self, id: ConnectionId) -> Option<Arc<AgentConnection>> {
        self.inner.read().await.by_id.get(&id).cloned()
    }

    /// The ready connection holding an agent identity, if any.
    pub async fn by_principal_and_workdir(
        &self,
        principal: PrincipalId,
        working_dir: &str,
    ) -> Option<Arc<AgentConnection>> {
        let inner = self.inner.read().await;
        let id = inner
            .by_addr
            .get(&(principal, working_dir.to_string()))?;
        inner
            .by_id
            .get(id)
            .filter(|c| c.is_ready(self.config.heartbeat_timeout()))
            .cloned()
    }

    /// The ready connection with an instance handle, if any.
    pub async fn by_instance_id(&self, instance: &InstanceId) -> Option<Arc<AgentConnection>> {
        let inner = self.inner.read().await;
        let id = inner.by_instance.get(instance)?;
        inner
            .by_id
            .get(id)
            .filter(|c| c.is_ready(self.config.heartbeat_timeout()))
            .cloned()
    }

    /// Every ready connection.
    pub async fn list_agents(&self) -> Vec<Arc<AgentConnection>> {
        let timeout = self.config.heartbeat_timeout();
        self.inner
            .read()
            .await
            .by_id
            .values()
            .filter(|c| c.is_ready(timeout))
            .cloned()
            .collect()
    }

    /// Number of tracked connections, ready or not.
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    /// Start the periodic heartbeat reaper.
    #[must_use]
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.config.reaper_sweep());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                manager.sweep_stale().await;
            }
        })
    }

    /// Remove every connection that is past reclaim: heartbeat stale for
    /// longer than timeout-plus-grace, or sitting in grace past the
    /// grace period.
    pub async fn sweep_stale(&self) {
        let heartbeat_timeout = self.config.heartbeat_timeout();
        let grace = self.config.reconnect_grace();

        let expired: Vec<Arc<AgentConnection>> = {
            let inner = self.inner.read().await;
            inner
                .by_id
                .values()
                .filter(|conn| match conn.state() {
                    ConnectionState::Ready => {
                        conn.heartbeat_age() >= heartbeat_timeout.saturating_add(grace)
                    },
                    ConnectionState::Grace { since } => {
                        Instant::now().saturating_duration_since(since) >= grace
                    },
                    ConnectionState::Displaced => true,
                })
                .cloned()
                .collect()
        };

        for conn in expired {
            warn!(
                connection = %conn.id(),
                principal = %conn.principal(),
                "Reaping expired agent connection"
            );
            self.remove(conn.id()).await;
        }
    }

    /// Tear a connection down and forget it.
    pub async fn remove(&self, id: ConnectionId) {
        let removed = {
            let mut inner = self.inner.write().await;
            let Some(conn) = inner.by_id.remove(&id) else {
                return;
            };
            let addr = (conn.principal(), conn.working_dir().to_string());
            if inner.by_addr.get(&addr) == Some(&id) {
                inner.by_addr.remove(&addr);
            }
            if inner.by_instance.get(conn.instance_id()) == Some(&id) {
                inner.by_instance.remove(conn.instance_id());
            }
            conn
        };
        removed.close_outbound().await;
        removed.close_fanout().await;
        debug!(connection = %id, "Agent connection removed");
    }

    /// Tear every connection down.
    pub async fn close(&self) {
        let all: Vec<Arc<AgentConnection>> = {
            let mut inner = self.inner.write().await;
            inner.by_addr.clear();
            inner.by_instance.clear();
            inner.by_id.drain().map(|(_, conn)| conn).collect()
        };
        for conn in all {
            conn.close_outbound().await;
            conn.close_fanout().await;
        }
    }

    async fn run_reader(
        self: Arc<Self>,
        conn: Arc<AgentConnection>,
        mut incoming: mpsc::Receiver<AgentFrame>,
    ) {
        while let Some(frame) = incoming.recv().await {
            // Any sign of life counts toward liveness.
            conn.touch_heartbeat();
            match frame {
                AgentFrame::Register(_) => {
                    warn!(connection = %conn.id(), "Duplicate register frame ignored");
                },
                AgentFrame::Heartbeat => {
                    trace!(connection = %conn.id(), "Heartbeat");
                },
                AgentFrame::MessageResponse { request_id, event } => {
                    conn.push_response(request_id, event).await;
                },
                AgentFrame::ToolCallRequest {
                    request_id,
                    tool_name,
                    input,
                } => {
                    let router = Arc::clone(&self.pack_router);
                    let conn = Arc::clone(&conn);
                    tokio::spawn(async move {
                        let outcome = match router
                            .route_tool_call(ToolCall {
                                request_id,
                                tool_name,
                                input,
                                agent_id: conn.principal(),
                            })
                            .await
                        {
                            Ok(response) => response.outcome,
                            Err(err) => ToolCallOutcome::Error(err.to_string()),
                        };
                        if conn
                            .send(GatewayFrame::ToolCallResponse {
                                request_id,
                                outcome,
                            })
                            .await
                            .is_err()
                        {
                            debug!(
                                connection = %conn.id(),
                                request = %request_id,
                                "Tool response undeliverable, connection gone"
                            );
                        }
                    });
                },
                AgentFrame::UserQuestionAnswer {
                    question_id,
                    answer,
                } => {
                    if let Err(err) = self
                        .questions
                        .deliver_answer(conn.principal(), question_id, answer)
                        .await
                    {
                        warn!(
                            connection = %conn.id(),
                            question = %question_id,
                            error = %err,
                            "Question answer rejected"
                        );
                    }
                },
            }
        }
        self.handle_stream_end(&conn).await;
    }

    async fn handle_stream_end(self: &Arc<Self>, conn: &Arc<AgentConnection>) {
        conn.close_outbound().await;
        // In-flight callers observe their response channels closing.
        conn.close_fanout().await;

        if matches!(conn.state(), ConnectionState::Displaced) {
            debug!(connection = %conn.id(), "Displaced connection's stream ended");
            return;
        }

        conn.set_state(ConnectionState::Grace {
            since: Instant::now(),
        });
        info!(
            connection = %conn.id(),
            principal = %conn.principal(),
            working_dir = %conn.working_dir(),
            grace_secs = self.config.reconnect_grace_secs,
            "Agent stream ended, holding identity through grace period"
        );

        let manager = Arc::clone(self);
        let conn = Arc::clone(conn);
        tokio::spawn(async move {
            tokio::time::sleep(manager.config.reconnect_grace()).await;
            if matches!(conn.state(), ConnectionState::Grace { .. }) {
                info!(connection = %conn.id(), "Grace period expired");
                manager.remove(conn.id()).await;
            }
        });
    }
}

impl std::fmt::Debug for AgentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentManager").finish_non_exhaustive()
    }
}

#[async_trait]
impl AgentDirectory for AgentManager {
    async fn ready_agents(&self) -> Vec<AgentSummary> {
        self.list_agents()
            .await
            .iter()
            .map(|conn| conn.summary())
            .collect()
    }
}

fn validate_registration(registration: &Registration) -> GatewayResult<()> {
    if registration.instance_id.trim().is_empty() {
        return Err(GatewayError::InvalidRegistration(
            "instance_id must not be empty".into(),
        ));
    }
    if registration.name.trim().is_empty() {
        return Err(GatewayError::InvalidRegistration(
            "name must not be empty".into(),
        ));
    }
    if registration.working_dir.trim().is_empty() {
        return Err(GatewayError::InvalidRegistration(
            "working_dir must not be empty".into(),
        ));
    }
    Ok(())
}

async fn run_writer(
    id: ConnectionId,
    mut queue: mpsc::Receiver<GatewayFrame>,
    outgoing: mpsc::Sender<GatewayFrame>,
) {
    while let Some(frame) = queue.recv().await {
        if outgoing.send(frame).await.is_err() {
            debug!(connection = %id, "Agent transport gone, writer exiting");
            break;
        }
    }
    trace!(connection = %id, "Writer task ended");
}
