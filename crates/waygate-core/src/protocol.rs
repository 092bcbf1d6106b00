//! Wire protocol frames for agent attachments.
//!
//! The transport itself (WebSocket, gRPC, in-process channels in tests)
//! is a collaborator concern; these types define the semantic shape of
//! what travels over it. Frames serialize as internally-tagged JSON so
//! any transport that can carry text can carry them.

use crate::capability::CapabilitySet;
use crate::id::{ConnectionId, PrincipalId, QuestionId, RequestId, ThreadId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The first frame an agent must send on a new attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    /// The agent's authenticated principal.
    pub principal: PrincipalId,
    /// Short opaque handle the agent chose for this session.
    pub instance_id: String,
    /// Human-readable agent name.
    pub name: String,
    /// Declared capability set.
    pub capabilities: CapabilitySet,
    /// Declared workspace names.
    pub workspaces: Vec<String>,
    /// Working directory the agent is serving.
    pub working_dir: String,
}

/// One event within an agent's streamed response to a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    /// What kind of event this is.
    pub kind: AgentEventKind,
    /// Text content, for kinds that carry it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Structured payload, for kinds that carry one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl AgentEvent {
    /// A text chunk.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: AgentEventKind::Text,
            text: Some(content.into()),
            payload: None,
        }
    }

    /// A thinking chunk.
    #[must_use]
    pub fn thinking(content: impl Into<String>) -> Self {
        Self {
            kind: AgentEventKind::Thinking,
            text: Some(content.into()),
            payload: None,
        }
    }

    /// A tool-use record.
    #[must_use]
    pub fn tool_use(payload: Value) -> Self {
        Self {
            kind: AgentEventKind::ToolUse,
            text: None,
            payload: Some(payload),
        }
    }

    /// A tool-result record.
    #[must_use]
    pub fn tool_result(payload: Value) -> Self {
        Self {
            kind: AgentEventKind::ToolResult,
            text: None,
            payload: Some(payload),
        }
    }

    /// The terminal marker ending a response stream.
    #[must_use]
    pub fn done() -> Self {
        Self {
            kind: AgentEventKind::Done,
            text: None,
            payload: None,
        }
    }

    /// An error event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: AgentEventKind::Error,
            text: Some(message.into()),
            payload: None,
        }
    }

    /// Whether this event terminates the response stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, AgentEventKind::Done | AgentEventKind::Error)
    }
}

/// Kinds of events an agent may stream back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentEventKind {
    /// Model thinking text.
    Thinking,
    /// Response text.
    Text,
    /// The agent started a tool invocation.
    ToolUse,
    /// A tool invocation finished.
    ToolResult,
    /// Token usage accounting.
    Usage,
    /// Incremental tool state (progress, partial output).
    ToolState,
    /// Terminal marker: the response is complete.
    Done,
    /// Terminal marker: the response failed.
    Error,
}

impl std::fmt::Display for AgentEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Thinking => "thinking",
            Self::Text => "text",
            Self::ToolUse => "tool_use",
            Self::ToolResult => "tool_result",
            Self::Usage => "usage",
            Self::ToolState => "tool_state",
            Self::Done => "done",
            Self::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// A client's answer to an `ask_user` question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionAnswer {
    /// The option the user picked, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<String>,
    /// Free-form text the user typed instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_text: Option<String>,
}

impl QuestionAnswer {
    /// Answer by selecting one of the offered options.
    #[must_use]
    pub fn selected(option: impl Into<String>) -> Self {
        Self {
            selected: Some(option.into()),
            custom_text: None,
        }
    }

    /// Answer with free-form text.
    #[must_use]
    pub fn custom(text: impl Into<String>) -> Self {
        Self {
            selected: None,
            custom_text: Some(text.into()),
        }
    }
}

/// Result of a routed tool call, as delivered back to the requesting agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum ToolCallOutcome {
    /// The tool produced output.
    Output(Value),
    /// The tool (or its routing) failed.
    Error(String),
}

impl ToolCallOutcome {
    /// Whether the call succeeded.
    #[must_use]
    pub fn is_output(&self) -> bool {
        matches!(self, Self::Output(_))
    }
}

/// Frames an agent sends to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum AgentFrame {
    /// Declare identity and capabilities; must be the first frame.
    Register(Registration),
    /// Liveness ping.
    Heartbeat,
    /// One event of a streamed response to a `SendMessage`.
    MessageResponse {
        /// Correlates with the originating `SendMessage`.
        request_id: RequestId,
        /// The response event.
        event: AgentEvent,
    },
    /// The agent wants a tool invoked on its behalf.
    ToolCallRequest {
        /// Correlation id minted by the agent.
        request_id: RequestId,
        /// Globally-unique tool name.
        tool_name: String,
        /// Tool input, matching the tool's schema.
        input: Value,
    },
    /// The agent relays a user's answer to a pending question.
    UserQuestionAnswer {
        /// The question being answered.
        question_id: QuestionId,
        /// The answer.
        answer: QuestionAnswer,
    },
}

/// Frames the gateway sends to an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum GatewayFrame {
    /// Registration accepted.
    Welcome {
        /// The id minted for this attachment.
        connection_id: ConnectionId,
    },
    /// Deliver a client message to the agent.
    SendMessage {
        /// Correlation id for the response stream.
        request_id: RequestId,
        /// The conversation thread this message belongs to.
        thread_id: ThreadId,
        /// Message content.
        content: String,
    },
    /// Result of a `ToolCallRequest`.
    ToolCallResponse {
        /// Correlates with the agent's request.
        request_id: RequestId,
        /// Output or error.
        outcome: ToolCallOutcome,
    },
}
