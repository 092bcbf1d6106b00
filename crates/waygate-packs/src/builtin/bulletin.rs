//! Bulletin tools — a fleet-wide message board.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;
use waygate_core::id::PrincipalId;
use waygate_storage::{BulletinPost, Store};

use super::{BuiltinTool, optional_str, optional_u64, required_str};
use crate::error::ToolResult;

const DEFAULT_READ_LIMIT: u64 = 20;

/// Builtin tool posting to the fleet bulletin board.
pub struct BulletinPostTool {
    store: Arc<dyn Store>,
}

impl BulletinPostTool {
    /// Create the tool.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BuiltinTool for BulletinPostTool {
    fn name(&self) -> &'static str {
        "bulletin_post"
    }

    fn description(&self) -> &'static str {
        "Post a message to the fleet-wide bulletin board, visible to every agent."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "body": {
                    "type": "string",
                    "description": "Post body"
                },
                "author_name": {
                    "type": "string",
                    "description": "Display name to post under, defaults to the agent id"
                }
            },
            "required": ["body"]
        })
    }

    async fn execute(&self, agent_id: PrincipalId, input: Value) -> ToolResult<Value> {
        let body = required_str(&input, "body")?;
        let author_name = optional_str(&input, "author_name")
            .map_or_else(|| agent_id.to_string(), str::to_string);

        let post = BulletinPost {
            id: Uuid::new_v4(),
            author: agent_id,
            author_name,
            body: body.to_string(),
            posted_at: Utc::now(),
        };
        self.store.post_bulletin(&post).await?;
        Ok(serde_json::json!({"posted": true, "id": post.id.to_string()}))
    }
}

/// Builtin tool reading recent bulletin posts.
pub struct BulletinReadTool {
    store: Arc<dyn Store>,
}

impl BulletinReadTool {
    /// Create the tool.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BuiltinTool for BulletinReadTool {
    fn name(&self) -> &'static str {
        "bulletin_read"
    }

    fn description(&self) -> &'static str {
        "Read recent posts from the fleet bulletin board, newest first."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "description": "Maximum posts to return, defaults to 20"
                }
            }
        })
    }

    async fn execute(&self, _agent_id: PrincipalId, input: Value) -> ToolResult<Value> {
        let limit = optional_u64(&input, "limit").unwrap_or(DEFAULT_READ_LIMIT);
        let posts = self
            .store
            .list_bulletins(usize::try_from(limit).unwrap_or(usize::MAX))
            .await?;
        let items: Vec<Value> = posts
            .iter()
            .map(|p| {
                serde_json::json!({
                    "id": p.id.to_string(),
                    "author": p.author_name,
                    "body": p.body,
                    "posted_at": p.posted_at.to_rfc3339(),
                })
            })
            .collect();
        Ok(serde_json::json!({"posts": items}))
    }
}
