//! Built-in tools running inside the gateway process.
//!
//! Each tool is a thin adapter over the `Store` (or the question router
//! for `ask_user`). Built-ins share the global tool namespace with
//! external packs and are dispatched directly on the calling task.

mod admin;
mod ask_user;
mod bulletin;
mod logging;
mod mail;
mod notes;
mod todos;

pub use admin::{AgentDirectory, AgentSummary, ListAgentsTool};
pub use ask_user::AskUserTool;
pub use bulletin::{BulletinPostTool, BulletinReadTool};
pub use logging::LogMessageTool;
pub use mail::{MailInboxTool, MailSendTool};
pub use notes::{NoteGetTool, NoteSaveTool};
pub use todos::{TodoAddTool, TodoCompleteTool, TodoListTool};

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use waygate_core::capability::CapabilitySet;
use waygate_core::id::PrincipalId;
use waygate_storage::Store;

use crate::error::{ToolError, ToolResult};
use crate::question::QuestionRouter;
use crate::registry::BuiltinPack;
use crate::types::ToolDefinition;

/// Name of the builtin base pack.
pub const BASE_PACK_NAME: &str = "builtin:base";

/// A tool that executes directly in the gateway process.
#[async_trait]
pub trait BuiltinTool: Send + Sync {
    /// Globally-unique tool name.
    fn name(&self) -> &'static str;

    /// Human-readable description.
    fn description(&self) -> &'static str;

    /// JSON Schema for the tool's input.
    fn input_schema(&self) -> Value;

    /// Capabilities an agent must declare to see this tool.
    fn required_capabilities(&self) -> CapabilitySet {
        CapabilitySet::new()
    }

    /// Per-tool timeout override, seconds.
    fn timeout_seconds(&self) -> Option<u64> {
        None
    }

    /// Execute the tool on behalf of an agent.
    async fn execute(&self, agent_id: PrincipalId, input: Value) -> ToolResult<Value>;

    /// The tool's definition as published in discovery.
    fn definition(&self) -> ToolDefinition {
        let mut def = ToolDefinition::new(self.name(), self.description())
            .with_schema(self.input_schema());
        def.required_capabilities = self.required_capabilities();
        def.timeout_seconds = self.timeout_seconds();
        def
    }
}

/// Assemble the builtin base pack over its collaborators.
#[must_use]
pub fn base_pack(
    store: Arc<dyn Store>,
    questions: Arc<QuestionRouter>,
    directory: Arc<dyn AgentDirectory>,
) -> BuiltinPack {
    BuiltinPack::new(BASE_PACK_NAME)
        .with_tool(Arc::new(LogMessageTool::new(Arc::clone(&store))))
        .with_tool(Arc::new(TodoAddTool::new(Arc::clone(&store))))
        .with_tool(Arc::new(TodoListTool::new(Arc::clone(&store))))
        .with_tool(Arc::new(TodoCompleteTool::new(Arc::clone(&store))))
        .with_tool(Arc::new(NoteSaveTool::new(Arc::clone(&store))))
        .with_tool(Arc::new(NoteGetTool::new(Arc::clone(&store))))
        .with_tool(Arc::new(BulletinPostTool::new(Arc::clone(&store))))
        .with_tool(Arc::new(BulletinReadTool::new(Arc::clone(&store))))
        .with_tool(Arc::new(MailSendTool::new(Arc::clone(&store))))
        .with_tool(Arc::new(MailInboxTool::new(store)))
        .with_tool(Arc::new(AskUserTool::new(questions)))
        .with_tool(Arc::new(ListAgentsTool::new(directory)))
}

// --- Argument helpers -------------------------------------------------------

pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> ToolResult<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("{key} is required")))
}

pub(crate) fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

pub(crate) fn optional_u64(args: &Value, key: &str) -> Option<u64> {
    args.get(key).and_then(Value::as_u64)
}

pub(crate) fn optional_bool(args: &Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}

pub(crate) fn optional_str_array(args: &Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
