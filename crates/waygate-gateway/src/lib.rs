//! Waygate Gateway - Control-plane gateway for fleets of agent processes.
//!
//! This crate provides:
//! - The agent connection manager: registration, heartbeat liveness,
//!   grace-period reconnects, and `(principal, working_dir)` addressing
//! - The message router: client sends in, journaled response streams out
//! - The dedupe cache making client sends idempotent
//! - The [`Gateway`] assembly wiring every core singleton together
//!
//! # Architecture
//!
//! ```text
//! client ──send_message──► MessageRouter ──queue──► agent stream
//!                              │   ▲
//!                       ledger │   │ response events
//!                   broadcaster▼   │
//!                            Store/Broadcaster
//!
//! agent ──tool call──► PackRouter ──► builtin handler
//!                           │        └► external pack stream
//!                           ◄── correlated response ──┘
//! ```
//!
//! Transports are collaborators: attachments hand the gateway a pair of
//! frame channels and the gateway never sees bytes on a wire.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod config;
pub mod connection;
pub mod dedupe;
pub mod error;
pub mod gateway;
pub mod manager;
pub mod router;

pub use config::GatewayConfig;
pub use connection::{AgentConnection, ConnectionState};
pub use dedupe::{DedupeCache, DedupeEntry};
pub use error::{GatewayError, GatewayResult};
pub use gateway::{Gateway, GatewayStats};
pub use manager::AgentManager;
pub use router::{MessageRouter, SendHandle, SendMessageRequest};
