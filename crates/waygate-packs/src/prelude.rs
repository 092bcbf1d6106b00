//! Prelude module - commonly used types for convenient import.
//!
//! Use `use waygate_packs::prelude::*;` to import all essential types.

// Registry & routing
pub use crate::registry::{BuiltinPack, PackInfo, PackRegistry};
pub use crate::router::{PackRouter, ToolCall};

// Attachments
pub use crate::attach::PackAttachmentService;
pub use crate::pack::Pack;

// Questions
pub use crate::question::{QuestionRouter, UserQuestion};

// Builtins
pub use crate::builtin::{AgentDirectory, AgentSummary, BuiltinTool, base_pack};

// Types & errors
pub use crate::error::{PackError, PackResult, ToolError};
pub use crate::types::{ExecuteToolRequest, PackManifest, ToolDefinition, ToolResponse};
