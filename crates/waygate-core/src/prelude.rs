//! Prelude module - commonly used types for convenient import.
//!
//! Use `use waygate_core::prelude::*;` to import all essential types.

// Identifiers
pub use crate::id::{
    ConnectionId, ConversationKey, EventId, InstanceId, PackId, PrincipalId, QuestionId, RequestId,
    ThreadId,
};

// Capabilities & principals
pub use crate::capability::CapabilitySet;
pub use crate::principal::{Principal, PrincipalKind, PrincipalStatus};

// Auth
pub use crate::auth::AuthContext;

// Protocol
pub use crate::protocol::{
    AgentEvent, AgentEventKind, AgentFrame, GatewayFrame, QuestionAnswer, Registration,
    ToolCallOutcome,
};
