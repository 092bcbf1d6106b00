//! Prelude module - commonly used types for convenient import.
//!
//! Use `use waygate_events::prelude::*;` to import all essential types.

// Broadcast fabric
pub use crate::{Broadcaster, DEFAULT_SUBSCRIBER_CAPACITY, Subscription};

// Ledger model
pub use crate::{Direction, EventKind, LedgerEvent};
