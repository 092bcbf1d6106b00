//! Mail tools — agent-to-agent messages with unread tracking.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;
use waygate_core::id::PrincipalId;
use waygate_storage::{MailMessage, Store};

use super::{BuiltinTool, optional_bool, optional_str, required_str};
use crate::error::{ToolError, ToolResult};

/// Builtin tool sending mail to another agent.
pub struct MailSendTool {
    store: Arc<dyn Store>,
}

impl MailSendTool {
    /// Create the tool.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BuiltinTool for MailSendTool {
    fn name(&self) -> &'static str {
        "mail_send"
    }

    fn description(&self) -> &'static str {
        "Send a message to another agent's mailbox. The recipient sees it on \
         their next mail_inbox call."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "to": {
                    "type": "string",
                    "description": "Recipient agent principal id (uuid)"
                },
                "subject": {
                    "type": "string",
                    "description": "Subject line"
                },
                "body": {
                    "type": "string",
                    "description": "Message body"
                }
            },
            "required": ["to", "body"]
        })
    }

    async fn execute(&self, agent_id: PrincipalId, input: Value) -> ToolResult<Value> {
        let raw_to = required_str(&input, "to")?;
        let to = Uuid::parse_str(raw_to)
            .map(PrincipalId)
            .map_err(|_| ToolError::InvalidArguments(format!("not a principal id: {raw_to}")))?;
        let body = required_str(&input, "body")?;
        let subject = optional_str(&input, "subject").unwrap_or("(no subject)");

        let mail = MailMessage {
            id: Uuid::new_v4(),
            from: agent_id,
            to,
            subject: subject.to_string(),
            body: body.to_string(),
            sent_at: Utc::now(),
            read: false,
        };
        self.store.send_mail(&mail).await?;
        Ok(serde_json::json!({"sent": true, "id": mail.id.to_string()}))
    }
}

/// Builtin tool fetching an agent's inbox.
pub struct MailInboxTool {
    store: Arc<dyn Store>,
}

impl MailInboxTool {
    /// Create the tool.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BuiltinTool for MailInboxTool {
    fn name(&self) -> &'static str {
        "mail_inbox"
    }

    fn description(&self) -> &'static str {
        "Fetch this agent's mailbox, newest first. Unread messages are marked \
         read unless mark_read is false."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "unread_only": {
                    "type": "boolean",
                    "description": "Only return unread messages (default true)"
                },
                "mark_read": {
                    "type": "boolean",
                    "description": "Mark returned messages read (default true)"
                }
            }
        })
    }

    async fn execute(&self, agent_id: PrincipalId, input: Value) -> ToolResult<Value> {
        let unread_only = optional_bool(&input, "unread_only", true);
        let mark_read = optional_bool(&input, "mark_read", true);

        let messages = self.store.inbox(agent_id, unread_only).await?;
        if mark_read {
            for message in &messages {
                if !message.read {
                    self.store.mark_mail_read(agent_id, message.id).await?;
                }
            }
        }

        let items: Vec<Value> = messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "id": m.id.to_string(),
                    "from": m.from.to_string(),
                    "subject": m.subject,
                    "body": m.body,
                    "sent_at": m.sent_at.to_rfc3339(),
                    "read": m.read,
                })
            })
            .collect();
        Ok(serde_json::json!({"messages": items}))
    }
}
