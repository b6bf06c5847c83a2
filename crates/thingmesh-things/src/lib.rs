//! Thingmesh device abstraction.
//!
//! This crate turns heterogeneous devices into uniform, semantically
//! described Things.
//!
//! ## Architecture
//!
//! - **Attribute**: a typed, semantically tagged property that validates and
//!   coerces values
//! - **Model**: an immutable collection of attributes with key resolution
//! - **Thing**: a live instance of a model with an input band (what the
//!   device reported) and an output band (what the application requested)
//! - **Bridge**: the protocol-specific side that talks to the real device
//! - **ThingFactory**: makes Things from a model, optionally through bridge
//!   discovery
//!
//! Data flows from a bridge's `pulled` report into the input band, and from
//! `Thing::set` through the output band into `Bridge::push`. The output band
//! is cleared once every push in flight has completed.

pub mod attribute;
pub mod bridge;
pub mod bridges;
pub mod error;
pub mod events;
pub mod factory;
pub mod find;
pub mod format;
pub mod model;
pub mod thing;
pub mod value;

pub use attribute::{Attribute, AttributeBuilder, Role};
pub use bridge::{Bridge, BridgeError, BridgeEvent, BridgeResult, BridgeSink, ConnectOptions};
pub use bridges::{MockBridge, PushBehavior};
pub use error::ModelError;
pub use events::{
    AttributeCallback, Band, EventBus, EventReceiver, FilteredReceiver, StateBand, ThingEvent,
    Topic, TopicCallback,
};
pub use factory::{Discovery, ThingFactory};
pub use find::{FindKey, Intent, Predicate};
pub use format::{Format, ValidateOptions};
pub use model::{AttributeDefinition, Model, ModelBuilder, ModelDefinition};
pub use thing::{Thing, UpdateOptions};
pub use value::{RawValue, ValueType};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
