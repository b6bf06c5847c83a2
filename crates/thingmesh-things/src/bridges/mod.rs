//! Bridge implementations shipped with the engine.
//!
//! Protocol bridges live in their own crates and only depend on the
//! [`Bridge`](crate::Bridge) trait. This module carries the in-memory
//! bridge used by tests and the demo.

pub mod mock;

pub use mock::{MockBridge, PushBehavior};
