//! Core types shared across thingmesh.
//!
//! This crate carries the ambient pieces every other crate depends on:
//! the unified error type, configuration defaults, logging setup, the
//! semantic vocabulary used to name attributes, and timestamp helpers.

pub mod config;
pub mod error;
pub mod logging;
pub mod timestamp;
pub mod vocab;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use timestamp::Timestamp;

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::config::{defaults, env_vars, EngineConfig};
    pub use crate::error::{Error, Result};
    pub use crate::logging::init_logging;
    pub use crate::timestamp::Timestamp;
    pub use crate::vocab::{compact, is_absolute_iri, purpose};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
