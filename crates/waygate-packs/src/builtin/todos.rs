//! Todo tools — per-agent work items backed by the store.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;
use waygate_core::id::PrincipalId;
use waygate_storage::{Store, TodoItem};

use super::{BuiltinTool, optional_bool, required_str};
use crate::error::{ToolError, ToolResult};

fn todo_json(todo: &TodoItem) -> Value {
    serde_json::json!({
        "id": todo.id.to_string(),
        "description": todo.description,
        "done": todo.done,
        "created_at": todo.created_at.to_rfc3339(),
    })
}

/// Builtin tool creating a todo item.
pub struct TodoAddTool {
    store: Arc<dyn Store>,
}

impl TodoAddTool {
    /// Create the tool.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BuiltinTool for TodoAddTool {
    fn name(&self) -> &'static str {
        "todo_add"
    }

    fn description(&self) -> &'static str {
        "Add an item to this agent's todo list."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "What needs doing"
                }
            },
            "required": ["description"]
        })
    }

    async fn execute(&self, agent_id: PrincipalId, input: Value) -> ToolResult<Value> {
        let description = required_str(&input, "description")?;
        let todo = TodoItem::new(agent_id, description);
        self.store.add_todo(&todo).await?;
        Ok(todo_json(&todo))
    }
}

/// Builtin tool listing an agent's todos.
pub struct TodoListTool {
    store: Arc<dyn Store>,
}

impl TodoListTool {
    /// Create the tool.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BuiltinTool for TodoListTool {
    fn name(&self) -> &'static str {
        "todo_list"
    }

    fn description(&self) -> &'static str {
        "List this agent's todo items. Open items only unless include_done is set."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "include_done": {
                    "type": "boolean",
                    "description": "Also return completed items"
                }
            }
        })
    }

    async fn execute(&self, agent_id: PrincipalId, input: Value) -> ToolResult<Value> {
        let include_done = optional_bool(&input, "include_done", false);
        let todos = self.store.list_todos(agent_id, include_done).await?;
        let items: Vec<Value> = todos.iter().map(todo_json).collect();
        Ok(serde_json::json!({"todos": items}))
    }
}

/// Builtin tool completing a todo item.
pub struct TodoCompleteTool {
    store: Arc<dyn Store>,
}

impl TodoCompleteTool {
    /// Create the tool.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BuiltinTool for TodoCompleteTool {
    fn name(&self) -> &'static str {
        "todo_complete"
    }

    fn description(&self) -> &'static str {
        "Mark one of this agent's todo items complete."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "id": {
                    "type": "string",
                    "description": "Id of the item, as returned by todo_add/todo_list"
                }
            },
            "required": ["id"]
        })
    }

    async fn execute(&self, agent_id: PrincipalId, input: Value) -> ToolResult<Value> {
        let raw = required_str(&input, "id")?;
        let id = Uuid::parse_str(raw)
            .map_err(|_| ToolError::InvalidArguments(format!("not a todo id: {raw}")))?;
        let todo = self.store.complete_todo(agent_id, id).await?;
        Ok(todo_json(&todo))
    }
}
