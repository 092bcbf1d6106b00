//! Waygate Test - Shared test utilities for the Waygate workspace.
//!
//! This crate provides scripted agent and pack harnesses plus common
//! fixtures, used across the workspace as a dev-dependency.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! waygate-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use waygate_test::{TestAgent, fast_config, memory_store};
//!
//! #[tokio::test]
//! async fn send_and_receive() {
//!     let gateway = Gateway::new(fast_config(), memory_store()).await.unwrap();
//!     let mut agent = TestAgent::attach(&gateway, "i1", "/w").await;
//!     // ...
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
