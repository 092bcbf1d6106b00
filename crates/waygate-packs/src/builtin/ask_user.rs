//! The `ask_user` tool — blocks the agent on a human answer.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use waygate_core::capability::CapabilitySet;
use waygate_core::id::PrincipalId;

use super::{BuiltinTool, optional_str_array, optional_u64, required_str};
use crate::error::ToolResult;
use crate::question::QuestionRouter;

/// Default wait for an answer, seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;
/// Allowed timeout range, seconds.
const MIN_TIMEOUT_SECS: u64 = 1;
const MAX_TIMEOUT_SECS: u64 = 300;

/// Builtin tool routing a question to a connected client and waiting for
/// the answer. Requires the `interactive` capability.
pub struct AskUserTool {
    questions: Arc<QuestionRouter>,
}

impl AskUserTool {
    /// Create the tool.
    #[must_use]
    pub fn new(questions: Arc<QuestionRouter>) -> Self {
        Self { questions }
    }
}

#[async_trait]
impl BuiltinTool for AskUserTool {
    fn name(&self) -> &'static str {
        "ask_user"
    }

    fn description(&self) -> &'static str {
        "Ask the human operating this agent a question and wait for their \
         answer. Offer options for quick selection, or leave them empty for \
         free-form input."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question to ask"
                },
                "options": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Choices to offer, optional"
                },
                "timeout_seconds": {
                    "type": "integer",
                    "description": "How long to wait, 1-300, default 60"
                }
            },
            "required": ["question"]
        })
    }

    fn required_capabilities(&self) -> CapabilitySet {
        CapabilitySet::from_names(["interactive"])
    }

    fn timeout_seconds(&self) -> Option<u64> {
        // The router must outwait the question's own clamped timeout.
        Some(MAX_TIMEOUT_SECS.saturating_add(5))
    }

    async fn execute(&self, agent_id: PrincipalId, input: Value) -> ToolResult<Value> {
        let question = required_str(&input, "question")?;
        let options = optional_str_array(&input, "options");
        let timeout_secs = optional_u64(&input, "timeout_seconds")
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS);

        let answer = self
            .questions
            .ask(
                agent_id,
                question,
                options,
                Duration::from_secs(timeout_secs),
            )
            .await;

        match answer {
            Some(answer) => Ok(serde_json::json!({
                "answered": true,
                "selected": answer.selected,
                "custom_text": answer.custom_text,
            })),
            None => Ok(serde_json::json!({
                "answered": false,
                "reason": "timeout",
            })),
        }
    }
}
