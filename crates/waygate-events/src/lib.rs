//! Waygate Events - Ledger event model and live broadcast fabric.
//!
//! This crate provides:
//! - The append-only [`LedgerEvent`] record journaling every message,
//!   tool call, and tool result in a conversation
//! - The [`Broadcaster`], an in-memory pub/sub keyed by conversation
//!   that pushes ledger events to live subscribers
//!
//! # Architecture
//!
//! The broadcaster is a performance optimization over polling: it never
//! blocks a publisher, and a subscriber whose buffer is full simply loses
//! events. The ledger (behind the `Store` abstraction) remains
//! authoritative — slow subscribers recover by catching up from storage.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod broadcaster;
mod event;

pub use broadcaster::{Broadcaster, DEFAULT_SUBSCRIBER_CAPACITY, Subscription};
pub use event::{Direction, EventKind, LedgerEvent};
