//! Tool and pack wire types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use waygate_core::capability::CapabilitySet;
use waygate_core::id::{PackId, PrincipalId, RequestId};
use waygate_core::protocol::ToolCallOutcome;

/// Definition of one callable tool.
///
/// Tool names are globally unique across every pack, builtin and
/// external alike.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Globally-unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's input.
    pub input_schema: Value,
    /// Capabilities an agent must declare to see this tool.
    #[serde(default)]
    pub required_capabilities: CapabilitySet,
    /// Per-tool timeout override, seconds. `None` uses the router default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl ToolDefinition {
    /// Create a definition with an open object schema and no gating.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({"type": "object"}),
            required_capabilities: CapabilitySet::new(),
            timeout_seconds: None,
        }
    }

    /// Set the input schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Require a capability.
    #[must_use]
    pub fn with_capability(mut self, name: impl Into<String>) -> Self {
        self.required_capabilities.insert(name);
        self
    }

    /// Set a per-tool timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }
}

/// The manifest a pack delivers when attaching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackManifest {
    /// The id the pack claims. At most one live attachment per id.
    pub pack_id: PackId,
    /// Pack version string.
    pub version: String,
    /// Tools the pack publishes.
    pub tools: Vec<ToolDefinition>,
}

impl PackManifest {
    /// Create a manifest.
    #[must_use]
    pub fn new(pack_id: impl Into<PackId>, version: impl Into<String>) -> Self {
        Self {
            pack_id: pack_id.into(),
            version: version.into(),
            tools: Vec::new(),
        }
    }

    /// Add a tool.
    #[must_use]
    pub fn with_tool(mut self, tool: ToolDefinition) -> Self {
        self.tools.push(tool);
        self
    }
}

/// A tool invocation forwarded to an external pack over its attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteToolRequest {
    /// Correlation id; the pack echoes it in its `ToolResponse`.
    pub request_id: RequestId,
    /// The tool to invoke.
    pub tool_name: String,
    /// Tool input.
    pub input: Value,
    /// The agent on whose behalf the call is made.
    pub agent_id: PrincipalId,
}

/// A pack's (or the router's) answer to one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    /// Correlates with the originating request.
    pub request_id: RequestId,
    /// Output or error.
    pub outcome: ToolCallOutcome,
}

impl ToolResponse {
    /// A successful response.
    #[must_use]
    pub fn output(request_id: RequestId, output: Value) -> Self {
        Self {
            request_id,
            outcome: ToolCallOutcome::Output(output),
        }
    }

    /// A tool-level error response.
    #[must_use]
    pub fn error(request_id: RequestId, message: impl Into<String>) -> Self {
        Self {
            request_id,
            outcome: ToolCallOutcome::Error(message.into()),
        }
    }
}
