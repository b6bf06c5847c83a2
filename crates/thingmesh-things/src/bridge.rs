//! Bridge interface between a Thing and a concrete device.
//!
//! A Bridge owns the protocol side of a device: it finds devices, connects
//! to them, forwards readings and applies writes. Things only ever talk to
//! a device through this trait. Bridges report back through a [`BridgeSink`]
//! so they never need a reference to the Thing that owns them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thingmesh_core::config::defaults;
use thiserror::Error;
use tokio::sync::mpsc;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Error type for bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The bridge does not support this operation
    #[error("Operation not implemented: {0}")]
    NotImplemented(&'static str),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Communication error
    #[error("Communication error: {0}")]
    Communication(String),

    /// Device is not reachable
    #[error("Device is not reachable")]
    Unreachable,

    /// Operation timeout
    #[error("Operation timeout after {0}ms")]
    Timeout(u64),

    /// Other error
    #[error("Bridge error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<BridgeError> for thingmesh_core::Error {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Timeout(ms) => thingmesh_core::Error::Timeout(format!("{ms}ms")),
            other => thingmesh_core::Error::Bridge(other.to_string()),
        }
    }
}

/// Event sent from a bridge to whoever is listening on its sink.
pub enum BridgeEvent {
    /// New device values, keyed by attribute code. `None` signals that
    /// only the bridge metadata changed.
    Pulled(Option<Map<String, Value>>),

    /// A new bridge instance bound to a freshly found device
    Discovered(Arc<dyn Bridge>),
}

impl std::fmt::Debug for BridgeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pulled(values) => f.debug_tuple("Pulled").field(values).finish(),
            Self::Discovered(bridge) => f.debug_tuple("Discovered").field(&bridge.name()).finish(),
        }
    }
}

/// Sending half handed to a bridge on `discover` and `connect`.
#[derive(Debug, Clone)]
pub struct BridgeSink {
    tx: mpsc::UnboundedSender<BridgeEvent>,
}

impl BridgeSink {
    /// Create a sink and the receiver that drains it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BridgeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report new device values, or `None` for a metadata-only change.
    pub fn pulled(&self, values: Option<Map<String, Value>>) {
        if self.tx.send(BridgeEvent::Pulled(values)).is_err() {
            tracing::debug!("Dropping pulled values, receiver is gone");
        }
    }

    /// Report a newly discovered device.
    pub fn discovered(&self, bridge: Arc<dyn Bridge>) {
        let name = bridge.name().to_string();
        if self.tx.send(BridgeEvent::Discovered(bridge)).is_err() {
            tracing::debug!(bridge = %name, "Dropping discovered bridge, receiver is gone");
        }
    }

    /// Whether the receiving side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Options passed to [`Bridge::connect`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    /// Bridge-specific connection parameters
    pub params: Map<String, Value>,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Device bridge trait.
///
/// Every method has a default so a bridge only implements what its device
/// supports. Defaults log and do nothing, except `push` which reports
/// [`BridgeError::NotImplemented`].
///
/// Implementations must not block: the engine calls `meta` and `reachable`
/// while deciding what to do with a change, and awaits the async methods
/// from background tasks.
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Get the bridge name.
    fn name(&self) -> &str;

    /// Look for devices, reporting each through `sink` as a new bridge.
    async fn discover(&self, _sink: BridgeSink) {
        tracing::warn!(bridge = %self.name(), "discover not implemented");
    }

    /// Connect to the device. Readings are reported through `sink`.
    async fn connect(&self, _sink: BridgeSink, _options: &ConnectOptions) -> BridgeResult<()> {
        tracing::warn!(bridge = %self.name(), "connect not implemented");
        Ok(())
    }

    /// Disconnect, returning an estimate of the seconds until the device
    /// goes quiet.
    async fn disconnect(&self) -> f64 {
        tracing::debug!(bridge = %self.name(), "disconnect not implemented");
        defaults::DISCONNECT_QUIET_SECS
    }

    /// Send device-coded values to the device.
    async fn push(&self, _values: Map<String, Value>) -> BridgeResult<()> {
        Err(BridgeError::NotImplemented("push"))
    }

    /// Ask the device for fresh values.
    async fn pull(&self) {
        tracing::debug!(bridge = %self.name(), "pull not implemented");
    }

    /// Device metadata, keyed by compact IRI.
    fn meta(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Whether the device can be talked to right now.
    fn reachable(&self) -> bool {
        true
    }
}
