//! Waygate Core - Foundation types for the Waygate control-plane gateway.
//!
//! This crate provides:
//! - Identifier newtypes used throughout the gateway
//! - Capability sets for tool gating
//! - Principal kinds and lifecycle status
//! - The `AuthContext` view stamped onto ledger events
//! - Wire protocol frames for agent attachments

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod auth;
pub mod capability;
pub mod id;
pub mod principal;
pub mod protocol;

pub use auth::AuthContext;
pub use capability::CapabilitySet;
pub use id::{
    ConnectionId, ConversationKey, EventId, InstanceId, PackId, PrincipalId, QuestionId, RequestId,
    ThreadId,
};
pub use principal::{Principal, PrincipalKind, PrincipalStatus};
pub use protocol::{
    AgentEvent, AgentEventKind, AgentFrame, GatewayFrame, QuestionAnswer, Registration,
    ToolCallOutcome,
};
