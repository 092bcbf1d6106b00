//! Storage error types.

/// Errors from storage operations.
///
/// Backends surface their uniqueness constraints as the typed sentinels
/// here; callers match on them rather than parsing messages.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested row was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A thread already exists for this `(frontend, external_id)` pair.
    #[error("duplicate thread: ({frontend}, {external_id})")]
    DuplicateThread {
        /// Frontend name.
        frontend: String,
        /// External conversation id within that frontend.
        external_id: String,
    },

    /// A storage operation failed.
    #[error("storage error: {0}")]
    Internal(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A pagination cursor could not be decoded.
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
}

impl StorageError {
    /// Whether this is the duplicate-thread sentinel.
    #[must_use]
    pub fn is_duplicate_thread(&self) -> bool {
        matches!(self, Self::DuplicateThread { .. })
    }

    /// Whether this is a not-found miss.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
