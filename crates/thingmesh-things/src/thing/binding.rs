//! Binding a Thing to a bridge.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use thingmesh_core::vocab::keys;

use crate::bridge::{Bridge, BridgeEvent, BridgeSink, ConnectOptions};
use crate::events::Band;

use super::dispatch::WeakThing;
use super::{Thing, UpdateOptions};

/// The live bridge of a Thing and the task forwarding its reports.
pub(super) struct Binding {
    bridge: Arc<dyn Bridge>,
    forward: JoinHandle<()>,
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.forward.abort();
    }
}

impl Thing {
    /// Bind `bridge` to this Thing and connect it.
    ///
    /// Any previous bridge is replaced. Pushes already handed to it are not
    /// waited for.
    pub fn bind_bridge(&self, bridge: Arc<dyn Bridge>) -> &Self {
        self.bind_bridge_with(bridge, ConnectOptions::default())
    }

    pub fn bind_bridge_with(&self, bridge: Arc<dyn Bridge>, options: ConnectOptions) -> &Self {
        let thing_id = derive_thing_id(bridge.as_ref(), self.inner.model.code());
        let (sink, rx) = BridgeSink::channel();
        let forward = tokio::spawn(forward_reports(self.downgrade(), rx));

        self.inner.meta.lock().thing_id = Some(thing_id.clone());
        let previous = self.inner.binding.write().replace(Binding {
            bridge: bridge.clone(),
            forward,
        });
        match previous {
            Some(previous) => info!(
                thing_id = %thing_id,
                bridge = %bridge.name(),
                previous = %previous.bridge.name(),
                "Rebound thing"
            ),
            None => info!(thing_id = %thing_id, bridge = %bridge.name(), "Bound thing"),
        }

        tokio::spawn(async move {
            if let Err(e) = bridge.connect(sink, &options).await {
                error!(thing_id = %thing_id, bridge = %bridge.name(), error = %e, "Bridge connect failed");
            }
        });
        self.meta_changed();
        self
    }

    /// The bound bridge, if any.
    pub fn bridge(&self) -> Option<Arc<dyn Bridge>> {
        self.inner
            .binding
            .read()
            .as_ref()
            .map(|binding| binding.bridge.clone())
    }

    /// Detach the bridge without disconnecting it.
    ///
    /// Requested values are abandoned and a meta event reports the Thing as
    /// unreachable.
    pub fn unbind_bridge(&self) -> Option<Arc<dyn Bridge>> {
        let binding = self.inner.binding.write().take()?;
        info!(thing_id = ?self.thing_id(), bridge = %binding.bridge.name(), "Unbound thing");
        let bridge = binding.bridge.clone();
        drop(binding);
        self.clear_ostate();
        self.meta_changed();
        Some(bridge)
    }

    /// Detach and disconnect the bridge.
    ///
    /// Returns the bridge's estimate of the seconds until the device goes
    /// quiet, or zero when nothing was bound.
    pub async fn disconnect(&self) -> f64 {
        match self.unbind_bridge() {
            Some(bridge) => bridge.disconnect().await,
            None => 0.0,
        }
    }

    /// Ask the bridge for fresh values. Results arrive through the input band.
    pub fn pull(&self) -> &Self {
        match self.bridge() {
            Some(bridge) => {
                tokio::spawn(async move { bridge.pull().await });
            }
            None => debug!(thing_id = ?self.thing_id(), "No bridge bound, nothing to pull"),
        }
        self
    }

    fn pulled(&self, values: Map<String, Value>) {
        let values: Map<String, Value> = values
            .into_iter()
            .map(|(code, value)| {
                let value = match self.inner.model.attribute(&code) {
                    Some(attribute) => attribute.from_device(&value),
                    None => value,
                };
                (code, value)
            })
            .collect();
        self.update(Band::Istate, values, UpdateOptions::default());
    }
}

fn derive_thing_id(bridge: &dyn Bridge, model_code: &str) -> String {
    match bridge.meta().get(keys::THING_ID).and_then(Value::as_str) {
        Some(id) => format!("{id}:{model_code}"),
        None => {
            let id = format!("urn:thingmesh:{}:{}", bridge.name(), uuid::Uuid::new_v4());
            warn!(bridge = %bridge.name(), thing_id = %id, "Bridge meta has no thing id, generated one");
            id
        }
    }
}

async fn forward_reports(weak: WeakThing, mut rx: mpsc::UnboundedReceiver<BridgeEvent>) {
    while let Some(event) = rx.recv().await {
        let Some(thing) = Thing::upgrade(&weak) else {
            break;
        };
        match event {
            BridgeEvent::Pulled(Some(values)) => thing.pulled(values),
            BridgeEvent::Pulled(None) => thing.meta_changed(),
            BridgeEvent::Discovered(bridge) => {
                debug!(bridge = %bridge.name(), "Ignoring discovery report on a bound thing")
            }
        }
    }
}
