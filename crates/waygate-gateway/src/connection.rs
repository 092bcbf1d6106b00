//! One live agent attachment.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock as StdRwLock;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::time::Instant;
use tracing::debug;
use waygate_core::capability::CapabilitySet;
use waygate_core::id::{ConnectionId, InstanceId, PrincipalId, RequestId};
use waygate_core::protocol::{AgentEvent, GatewayFrame, Registration};
use waygate_packs::AgentSummary;

use crate::error::{GatewayError, GatewayResult};

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Attached and serving.
    Ready,
    /// Stream dropped; identity reserved for reconnect.
    Grace {
        /// When the stream dropped.
        since: Instant,
    },
    /// Displaced by a newer attachment for the same identity.
    Displaced,
}

/// A live agent attachment and the state the gateway keeps for it.
///
/// The outbound frame queue sits behind a close-mutex held across every
/// send, so closing the queue cannot race an in-progress send; after
/// `close_outbound` returns, sends deterministically fail.
pub struct AgentConnection {
    id: ConnectionId,
    principal: PrincipalId,
    instance_id: InstanceId,
    name: String,
    capabilities: CapabilitySet,
    workspaces: Vec<String>,
    working_dir: String,
    connected_at: DateTime<Utc>,
    outbound: Mutex<Option<mpsc::Sender<GatewayFrame>>>,
    last_heartbeat: StdRwLock<Instant>,
    state: StdRwLock<ConnectionState>,
    fanout: RwLock<HashMap<RequestId, mpsc::Sender<AgentEvent>>>,
}

impl AgentConnection {
    /// Create a connection from a validated registration, returning the
    /// receiving half of its outbound queue for the writer task.
    #[must_use]
    pub fn new(
        registration: Registration,
        queue_capacity: usize,
    ) -> (Self, mpsc::Receiver<GatewayFrame>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        (
            Self {
                id: ConnectionId::new(),
                principal: registration.principal,
                instance_id: InstanceId::new(registration.instance_id),
                name: registration.name,
                capabilities: registration.capabilities,
                workspaces: registration.workspaces,
                working_dir: registration.working_dir,
                connected_at: Utc::now(),
                outbound: Mutex::new(Some(tx)),
                last_heartbeat: StdRwLock::new(Instant::now()),
                state: StdRwLock::new(ConnectionState::Ready),
                fanout: RwLock::new(HashMap::new()),
            },
            rx,
        )
    }

    /// The attachment's connection id.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The agent's principal.
    #[must_use]
    pub fn principal(&self) -> PrincipalId {
        self.principal
    }

    /// The instance handle the agent chose.
    #[must_use]
    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    /// The agent's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared capabilities.
    #[must_use]
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Declared workspaces.
    #[must_use]
    pub fn workspaces(&self) -> &[String] {
        &self.workspaces
    }

    /// Working directory the agent serves.
    #[must_use]
    pub fn working_dir(&self) -> &str {
        &self.working_dir
    }

    /// When the attachment registered.
    #[must_use]
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Enqueue a frame for the agent.
    ///
    /// Suspends while the queue is full; callers bound the wait with
    /// their own deadline.
    ///
    /// # Errors
    ///
    /// [`GatewayError::ConnectionClosed`] once the queue is closed or the
    /// writer task is gone.
    pub async fn send(&self, frame: GatewayFrame) -> GatewayResult<()> {
        let guard = self.outbound.lock().await;
        let tx = guard
            .as_ref()
            .ok_or(GatewayError::ConnectionClosed(self.id))?;
        tx.send(frame)
            .await
            .map_err(|_| GatewayError::ConnectionClosed(self.id))
    }

    /// Close the outbound queue. Idempotent; returns `true` for the call
    /// that actually closed it.
    pub async fn close_outbound(&self) -> bool {
        self.outbound.lock().await.take().is_some()
    }

    /// Record a heartbeat (or any sign of life) from the agent.
    pub fn touch_heartbeat(&self) {
        if let Ok(mut hb) = self.last_heartbeat.write() {
            *hb = Instant::now();
        }
    }

    /// When the agent last showed life.
    #[must_use]
    pub fn last_heartbeat(&self) -> Instant {
        self.last_heartbeat
            .read()
            .map_or_else(|_| Instant::now(), |hb| *hb)
    }

    /// Age of the last heartbeat.
    #[must_use]
    pub fn heartbeat_age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_heartbeat())
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
            .read()
            .map_or(ConnectionState::Displaced, |s| *s)
    }

    /// Move the connection to a new lifecycle state.
    pub fn set_state(&self, state: ConnectionState) {
        if let Ok(mut s) = self.state.write() {
            *s = state;
        }
    }

    /// Whether the connection is addressable: in `Ready` state with a
    /// heartbeat younger than the timeout.
    #[must_use]
    pub fn is_ready(&self, heartbeat_timeout: Duration) -> bool {
        matches!(self.state(), ConnectionState::Ready) && self.heartbeat_age() < heartbeat_timeout
    }

    /// Register a response channel for an in-flight request.
    ///
    /// The receiving half goes to the request's pump worker; the read
    /// task pushes `MessageResponse` events into the sending half.
    pub async fn register_fanout(
        &self,
        request_id: RequestId,
        capacity: usize,
    ) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.fanout.write().await.insert(request_id, tx);
        rx
    }

    /// Push one response event to its waiting pump.
    ///
    /// Returns `false` when no pump is registered for the request (late
    /// or unsolicited event) or the pump has gone away.
    pub async fn push_response(&self, request_id: RequestId, event: AgentEvent) -> bool {
        let fanout = self.fanout.read().await;
        let Some(tx) = fanout.get(&request_id) else {
            debug!(connection = %self.id, request = %request_id, "Response event with no waiter");
            return false;
        };
        tx.send(event).await.is_ok()
    }

    /// Drop the response channel for a finished request.
    pub async fn remove_fanout(&self, request_id: RequestId) {
        self.fanout.write().await.remove(&request_id);
    }

    /// Drop every response channel; waiting pumps observe closure.
    pub async fn close_fanout(&self) {
        self.fanout.write().await.clear();
    }

    /// Number of in-flight requests on this connection.
    pub async fn inflight_count(&self) -> usize {
        self.fanout.read().await.len()
    }

    /// Snapshot for admin surfaces.
    #[must_use]
    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            connection_id: self.id,
            principal: self.principal,
            instance_id: self.instance_id.clone(),
            name: self.name.clone(),
            working_dir: self.working_dir.clone(),
            capabilities: self.capabilities.clone(),
            connected_at: self.connected_at,
        }
    }
}

impl std::fmt::Debug for AgentConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConnection")
            .field("id", &self.id)
            .field("principal", &self.principal)
            .field("instance_id", &self.instance_id)
            .field("working_dir", &self.working_dir)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waygate_core::protocol::AgentEventKind;

    fn registration() -> Registration {
        Registration {
            principal: PrincipalId::new(),
            instance_id: "ab12".into(),
            name: "builder".into(),
            capabilities: CapabilitySet::from_names(["base"]),
            workspaces: vec!["default".into()],
            working_dir: "/w".into(),
        }
    }

    #[tokio::test]
    async fn send_flows_through_the_queue() {
        let (conn, mut rx) = AgentConnection::new(registration(), 4);
        conn.send(GatewayFrame::Welcome {
            connection_id: conn.id(),
        })
        .await
        .unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(GatewayFrame::Welcome { .. })
        ));
    }

    #[tokio::test]
    async fn send_after_close_fails_deterministically() {
        let (conn, _rx) = AgentConnection::new(registration(), 4);
        assert!(conn.close_outbound().await);
        assert!(!conn.close_outbound().await);
        let err = conn
            .send(GatewayFrame::Welcome {
                connection_id: conn.id(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ConnectionClosed(_)));
    }

    #[tokio::test]
    async fn readiness_tracks_state_and_heartbeat() {
        let (conn, _rx) = AgentConnection::new(registration(), 4);
        let timeout = Duration::from_secs(90);
        assert!(conn.is_ready(timeout));

        conn.set_state(ConnectionState::Grace {
            since: Instant::now(),
        });
        assert!(!conn.is_ready(timeout));

        conn.set_state(ConnectionState::Ready);
        assert!(conn.is_ready(timeout));
        // A zero timeout makes any heartbeat stale.
        assert!(!conn.is_ready(Duration::ZERO));
    }

    #[tokio::test]
    async fn fanout_routes_by_request_id() {
        let (conn, _rx) = AgentConnection::new(registration(), 4);
        let req_a = RequestId::new();
        let req_b = RequestId::new();
        let mut rx_a = conn.register_fanout(req_a, 4).await;
        let mut rx_b = conn.register_fanout(req_b, 4).await;

        assert!(conn.push_response(req_a, AgentEvent::text("for a")).await);
        assert!(conn.push_response(req_b, AgentEvent::done()).await);

        assert_eq!(rx_a.recv().await.unwrap().text.as_deref(), Some("for a"));
        assert_eq!(rx_b.recv().await.unwrap().kind, AgentEventKind::Done);

        assert!(!conn.push_response(RequestId::new(), AgentEvent::done()).await);
    }

    #[tokio::test]
    async fn close_fanout_wakes_pumps() {
        let (conn, _rx) = AgentConnection::new(registration(), 4);
        let req = RequestId::new();
        let mut rx = conn.register_fanout(req, 4).await;
        conn.close_fanout().await;
        assert!(rx.recv().await.is_none());
        assert_eq!(conn.inflight_count().await, 0);
    }
}
