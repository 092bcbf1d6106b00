//! Gateway error types.

use waygate_core::id::ConnectionId;

/// Errors from gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No channel binding exists for `(frontend, channel_id)`.
    #[error("channel not bound: ({frontend}, {channel_id})")]
    ChannelNotBound {
        /// Frontend name.
        frontend: String,
        /// Channel id within that frontend.
        channel_id: String,
    },

    /// No ready connection exists for the targeted agent identity.
    #[error("agent unavailable: {0}")]
    AgentUnavailable(String),

    /// The requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The attachment's first frame was missing or malformed.
    #[error("invalid registration: {0}")]
    InvalidRegistration(String),

    /// The agent's connection closed under an in-flight operation.
    #[error("connection closed: {0}")]
    ConnectionClosed(ConnectionId),

    /// The caller cancelled the operation.
    #[error("cancelled")]
    Cancelled,

    /// The request was malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// A storage operation failed.
    #[error(transparent)]
    Storage(#[from] waygate_storage::StorageError),

    /// A pack operation failed.
    #[error(transparent)]
    Pack(#[from] waygate_packs::PackError),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
