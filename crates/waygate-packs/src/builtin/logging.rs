//! Log message tool — journals a line into the agent's log conversation.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use waygate_core::id::{ConversationKey, PrincipalId};
use waygate_events::{Direction, LedgerEvent};
use waygate_storage::Store;

use super::{BuiltinTool, optional_str, required_str};
use crate::error::ToolResult;

/// Builtin tool appending a `system` ledger event to the agent's
/// per-agent log conversation (`agent-log:<principal>`).
pub struct LogMessageTool {
    store: Arc<dyn Store>,
}

impl LogMessageTool {
    /// Create the tool.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The log conversation key for an agent.
    #[must_use]
    pub fn log_key(agent_id: PrincipalId) -> ConversationKey {
        ConversationKey::new(format!("agent-log:{}", agent_id.0))
    }
}

#[async_trait]
impl BuiltinTool for LogMessageTool {
    fn name(&self) -> &'static str {
        "log_message"
    }

    fn description(&self) -> &'static str {
        "Append a line to this agent's durable log. Use for progress notes an \
         operator might want to review later."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The line to log"
                },
                "level": {
                    "type": "string",
                    "enum": ["debug", "info", "warn", "error"],
                    "description": "Severity, defaults to info"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, agent_id: PrincipalId, input: Value) -> ToolResult<Value> {
        let message = required_str(&input, "message")?;
        let level = optional_str(&input, "level").unwrap_or("info");

        let event = LedgerEvent::system(
            Self::log_key(agent_id),
            Direction::OutboundFromAgent,
            "agent",
            format!("[{level}] {message}"),
        )
        .with_actor(agent_id);
        let event_id = event.id;
        self.store.save_event(&event).await?;

        Ok(serde_json::json!({
            "logged": true,
            "event_id": event_id.to_string(),
        }))
    }
}
