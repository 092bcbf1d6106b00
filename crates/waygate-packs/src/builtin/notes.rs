//! Note tools — named per-agent scratch documents.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use waygate_core::id::PrincipalId;
use waygate_storage::{Note, Store};

use super::{BuiltinTool, required_str};
use crate::error::ToolResult;

/// Builtin tool creating or replacing a named note.
pub struct NoteSaveTool {
    store: Arc<dyn Store>,
}

impl NoteSaveTool {
    /// Create the tool.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BuiltinTool for NoteSaveTool {
    fn name(&self) -> &'static str {
        "note_save"
    }

    fn description(&self) -> &'static str {
        "Save a named note for this agent, replacing any previous content."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Note name, unique per agent"
                },
                "content": {
                    "type": "string",
                    "description": "Note body"
                }
            },
            "required": ["name", "content"]
        })
    }

    async fn execute(&self, agent_id: PrincipalId, input: Value) -> ToolResult<Value> {
        let name = required_str(&input, "name")?;
        let content = required_str(&input, "content")?;
        let note = Note {
            agent_id,
            name: name.to_string(),
            content: content.to_string(),
            updated_at: Utc::now(),
        };
        self.store.save_note(&note).await?;
        Ok(serde_json::json!({"saved": true, "name": name}))
    }
}

/// Builtin tool fetching a named note.
pub struct NoteGetTool {
    store: Arc<dyn Store>,
}

impl NoteGetTool {
    /// Create the tool.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BuiltinTool for NoteGetTool {
    fn name(&self) -> &'static str {
        "note_get"
    }

    fn description(&self) -> &'static str {
        "Fetch one of this agent's named notes."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Note name"
                }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, agent_id: PrincipalId, input: Value) -> ToolResult<Value> {
        let name = required_str(&input, "name")?;
        match self.store.get_note(agent_id, name).await? {
            Some(note) => Ok(serde_json::json!({
                "found": true,
                "name": note.name,
                "content": note.content,
                "updated_at": note.updated_at.to_rfc3339(),
            })),
            None => Ok(serde_json::json!({"found": false, "name": name})),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waygate_storage::MemoryStore;

    #[tokio::test]
    async fn save_then_get() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let agent = PrincipalId::new();
        let save = NoteSaveTool::new(Arc::clone(&store));
        let get = NoteGetTool::new(store);

        save.execute(agent, serde_json::json!({"name": "plan", "content": "v1"}))
            .await
            .unwrap();
        save.execute(agent, serde_json::json!({"name": "plan", "content": "v2"}))
            .await
            .unwrap();

        let note = get
            .execute(agent, serde_json::json!({"name": "plan"}))
            .await
            .unwrap();
        assert_eq!(note["found"], true);
        assert_eq!(note["content"], "v2");
    }

    #[tokio::test]
    async fn missing_note_reports_not_found() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let get = NoteGetTool::new(store);
        let note = get
            .execute(PrincipalId::new(), serde_json::json!({"name": "ghost"}))
            .await
            .unwrap();
        assert_eq!(note["found"], false);
    }
}
