//! Pack subsystem error types.

use waygate_core::id::{PackId, QuestionId, RequestId};

/// Errors from pack registration and tool routing.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// A live pack already holds this pack id.
    #[error("pack already registered: {0}")]
    PackAlreadyRegistered(PackId),

    /// A manifest tool collides with an existing builtin or external tool.
    #[error("tool name collision: {0}")]
    ToolCollision(String),

    /// No tool with this name is registered.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// The pack's send-queue has been closed.
    #[error("pack is closed")]
    PackClosed,

    /// The pack's attachment stream ended while a request was outstanding.
    #[error("pack disconnected")]
    PackDisconnected,

    /// A pending request with this id already exists.
    #[error("duplicate request id: {0}")]
    DuplicateRequestId(RequestId),

    /// The tool did not respond within its deadline.
    #[error("tool {tool} timed out after {seconds}s")]
    Timeout {
        /// Tool name.
        tool: String,
        /// Effective timeout that elapsed.
        seconds: u64,
    },

    /// No pending question with this id exists.
    #[error("question not found: {0}")]
    QuestionNotFound(QuestionId),

    /// The request was malformed.
    #[error("validation error: {0}")]
    Validation(String),
}

/// Result type for pack operations.
pub type PackResult<T> = Result<T, PackError>;

/// Errors a builtin tool handler may raise.
///
/// These surface as tool-level error outcomes, never as routing errors:
/// a failing handler produces a `ToolCallOutcome::Error` for the agent.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The input did not match the tool's schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The handler ran but failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backing store failed.
    #[error(transparent)]
    Storage(#[from] waygate_storage::StorageError),
}

/// Result type for builtin tool handlers.
pub type ToolResult<T> = Result<T, ToolError>;
