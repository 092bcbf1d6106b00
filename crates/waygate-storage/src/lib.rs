//! Waygate Storage - Store contract and in-memory backend.
//!
//! This crate provides:
//! - The [`Store`] trait the gateway persists through: ledger events,
//!   threads, channel bindings, agent state, and the builtin tool tables
//! - Typed sentinel errors ([`StorageError`]) for uniqueness violations
//!   and misses
//! - [`MemoryStore`], an in-memory backend for tests and embedded use
//!
//! Production backends (SQLite and friends) live outside the gateway and
//! implement [`Store`]; the gateway never assumes anything beyond the
//! trait contract.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod error;
pub mod memory;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use store::{
    BulletinPost, ChannelBinding, EventPage, MailMessage, Note, Store, Thread, TodoItem,
};
