//! Prelude module - commonly used types for convenient import.
//!
//! Use `use waygate_storage::prelude::*;` to import all essential types.

// Contract
pub use crate::store::{
    BulletinPost, ChannelBinding, EventPage, MailMessage, Note, Store, Thread, TodoItem,
};

// Errors
pub use crate::error::{StorageError, StorageResult};

// Backends
pub use crate::memory::MemoryStore;
