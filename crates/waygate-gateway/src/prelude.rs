//! Prelude module - commonly used types for convenient import.
//!
//! Use `use waygate_gateway::prelude::*;` to import all essential types.

// Assembly
pub use crate::gateway::{Gateway, GatewayStats};

// Configuration
pub use crate::config::GatewayConfig;

// Connections
pub use crate::connection::{AgentConnection, ConnectionState};
pub use crate::manager::AgentManager;

// Routing
pub use crate::router::{MessageRouter, SendHandle, SendMessageRequest};

// Dedupe
pub use crate::dedupe::{DedupeCache, DedupeEntry};

// Errors
pub use crate::error::{GatewayError, GatewayResult};
