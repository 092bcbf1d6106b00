//! Waygate Packs - Tool pack registry, router, and builtin tools.
//!
//! This crate provides:
//! - A unified, capability-filtered tool namespace over in-process
//!   ("builtin") tools and remotely-attached ("external") tool packs
//! - Request/response correlation for tools invoked over a pack's
//!   streaming attachment, with per-tool timeouts
//! - The attachment service a remote pack connects through
//! - The question router backing the `ask_user` tool
//! - The builtin base pack (todos, notes, bulletin, mail, logging,
//!   admin, ask_user)
//!
//! # Architecture
//!
//! The [`PackRegistry`] owns every live pack and enforces global
//! tool-name uniqueness atomically. The [`PackRouter`] dispatches calls:
//! builtin handlers run on the calling task; external calls are enqueued
//! on the owning pack's bounded queue and awaited under a deadline. The
//! [`PackAttachmentService`] drains that queue onto the pack's stream
//! and feeds responses back into the router.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod attach;
pub mod builtin;
pub mod error;
pub mod pack;
pub mod question;
pub mod registry;
pub mod router;
pub mod types;

pub use attach::PackAttachmentService;
pub use builtin::{
    AgentDirectory, AgentSummary, AskUserTool, BuiltinTool, base_pack,
};
pub use error::{PackError, PackResult, ToolError};
pub use pack::Pack;
pub use question::{QuestionRouter, UserQuestion};
pub use registry::{BuiltinPack, DEFAULT_PACK_QUEUE_CAPACITY, PackInfo, PackRegistry};
pub use router::{DEFAULT_TOOL_TIMEOUT, PackRouter, ToolCall};
pub use types::{ExecuteToolRequest, PackManifest, ToolDefinition, ToolResponse};
