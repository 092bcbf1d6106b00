//! The append-only ledger event record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use waygate_core::id::{ConversationKey, EventId, PrincipalId, RequestId};
use waygate_core::protocol::{AgentEvent, AgentEventKind};

/// Which way a ledger event travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// From a client toward an agent.
    InboundToAgent,
    /// From an agent toward its clients.
    OutboundFromAgent,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InboundToAgent => write!(f, "inbound_to_agent"),
            Self::OutboundFromAgent => write!(f, "outbound_from_agent"),
        }
    }
}

/// What kind of record a ledger event is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A conversational message.
    Message,
    /// An agent started a tool invocation.
    ToolCall,
    /// A tool invocation finished.
    ToolResult,
    /// A system notice (usage, progress, terminal markers).
    System,
    /// Something went wrong.
    Error,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Message => "message",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::System => "system",
            Self::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// One immutable row in the conversation ledger.
///
/// Events are only ever appended; nothing in the gateway mutates or
/// deletes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Unique event id.
    pub id: EventId,
    /// The conversation this event belongs to.
    pub conversation_key: ConversationKey,
    /// Which way the event travelled.
    pub direction: Direction,
    /// Display name of whoever authored the event.
    pub author: String,
    /// When the gateway recorded the event.
    pub timestamp: DateTime<Utc>,
    /// What kind of record this is.
    pub kind: EventKind,
    /// Text content, when the event carries any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Structured payload (tool input/output, usage counters).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// The request this event was produced under, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    /// The authenticated principal that caused the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_principal: Option<PrincipalId>,
    /// Frontend-specific member id of the acting user, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_member: Option<String>,
}

impl LedgerEvent {
    /// Create a `message` event.
    #[must_use]
    pub fn message(
        conversation_key: ConversationKey,
        direction: Direction,
        author: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: EventId::new(),
            conversation_key,
            direction,
            author: author.into(),
            timestamp: Utc::now(),
            kind: EventKind::Message,
            text: Some(text.into()),
            payload: None,
            request_id: None,
            actor_principal: None,
            actor_member: None,
        }
    }

    /// Create a `system` event.
    #[must_use]
    pub fn system(
        conversation_key: ConversationKey,
        direction: Direction,
        author: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            kind: EventKind::System,
            ..Self::message(conversation_key, direction, author, text)
        }
    }

    /// Create an `error` event.
    #[must_use]
    pub fn error(
        conversation_key: ConversationKey,
        direction: Direction,
        author: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            kind: EventKind::Error,
            ..Self::message(conversation_key, direction, author, text)
        }
    }

    /// Build the outbound ledger record for one streamed agent event.
    #[must_use]
    pub fn from_agent_event(
        conversation_key: ConversationKey,
        author: impl Into<String>,
        request_id: RequestId,
        event: &AgentEvent,
    ) -> Self {
        let kind = match event.kind {
            AgentEventKind::Text => EventKind::Message,
            AgentEventKind::ToolUse => EventKind::ToolCall,
            AgentEventKind::ToolResult => EventKind::ToolResult,
            AgentEventKind::Error => EventKind::Error,
            AgentEventKind::Thinking
            | AgentEventKind::Usage
            | AgentEventKind::ToolState
            | AgentEventKind::Done => EventKind::System,
        };
        let text = match event.kind {
            AgentEventKind::Done => Some("done".to_string()),
            _ => event.text.clone(),
        };
        Self {
            id: EventId::new(),
            conversation_key,
            direction: Direction::OutboundFromAgent,
            author: author.into(),
            timestamp: Utc::now(),
            kind,
            text,
            payload: event.payload.clone(),
            request_id: Some(request_id),
            actor_principal: None,
            actor_member: None,
        }
    }

    /// Stamp the acting principal.
    #[must_use]
    pub fn with_actor(mut self, principal: PrincipalId) -> Self {
        self.actor_principal = Some(principal);
        self
    }

    /// Stamp the frontend member id of the acting user.
    #[must_use]
    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.actor_member = Some(member.into());
        self
    }

    /// Tag the event with its originating request.
    #[must_use]
    pub fn with_request(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }
}
