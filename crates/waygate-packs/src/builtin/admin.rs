//! Admin tools — operator views over the live fleet.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use waygate_core::capability::CapabilitySet;
use waygate_core::id::{ConnectionId, InstanceId, PrincipalId};

use super::BuiltinTool;
use crate::error::ToolResult;

/// Snapshot of one ready agent connection.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    /// Connection id of the live attachment.
    pub connection_id: ConnectionId,
    /// The agent's principal.
    pub principal: PrincipalId,
    /// The instance handle the agent chose for this session.
    pub instance_id: InstanceId,
    /// Agent name.
    pub name: String,
    /// Working directory the agent serves.
    pub working_dir: String,
    /// Declared capabilities.
    pub capabilities: CapabilitySet,
    /// When the attachment registered.
    pub connected_at: DateTime<Utc>,
}

/// Read-only view over the live fleet.
///
/// Implemented by the agent connection manager; defined here so the
/// admin tool does not need to depend on the gateway crate.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Every currently-ready agent connection.
    async fn ready_agents(&self) -> Vec<AgentSummary>;
}

/// Builtin tool listing ready agents. Requires the `admin` capability.
pub struct ListAgentsTool {
    directory: Arc<dyn AgentDirectory>,
}

impl ListAgentsTool {
    /// Create the tool.
    #[must_use]
    pub fn new(directory: Arc<dyn AgentDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl BuiltinTool for ListAgentsTool {
    fn name(&self) -> &'static str {
        "list_agents"
    }

    fn description(&self) -> &'static str {
        "List every agent currently attached and ready, with its principal, \
         instance id, and working directory."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    fn required_capabilities(&self) -> CapabilitySet {
        CapabilitySet::from_names(["admin"])
    }

    async fn execute(&self, _agent_id: PrincipalId, _input: Value) -> ToolResult<Value> {
        let agents = self.directory.ready_agents().await;
        let items: Vec<Value> = agents
            .iter()
            .map(|a| {
                serde_json::json!({
                    "connection_id": a.connection_id.to_string(),
                    "principal": a.principal.to_string(),
                    "instance_id": a.instance_id.as_str(),
                    "name": a.name,
                    "working_dir": a.working_dir,
                    "capabilities": a.capabilities,
                    "connected_at": a.connected_at.to_rfc3339(),
                })
            })
            .collect();
        Ok(serde_json::json!({"agents": items}))
    }
}
