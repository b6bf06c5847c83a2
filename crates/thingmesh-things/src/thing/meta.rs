//! The `meta` band: identity and bridge metadata.

use serde_json::{Map, Value};

use thingmesh_core::timestamp::{self, Timestamp};
use thingmesh_core::vocab::{self, keys};

use super::dispatch::Notification;
use super::Thing;

#[derive(Debug, Default)]
pub(super) struct MetaState {
    pub overrides: Map<String, Value>,
    pub timestamp: Option<Timestamp>,
    pub thing_id: Option<String>,
}

impl Thing {
    /// Globally unique id, assigned when a bridge is bound.
    pub fn thing_id(&self) -> Option<String> {
        self.inner.meta.lock().thing_id.clone()
    }

    /// Whether a bridge is bound and reports the device reachable.
    pub fn is_reachable(&self) -> bool {
        self.bridge().is_some_and(|bridge| bridge.reachable())
    }

    /// Override a metadata entry. Keys given as full IRIs are compacted.
    pub fn set_meta(&self, key: &str, value: impl Into<Value>) -> &Self {
        self.inner
            .meta
            .lock()
            .overrides
            .insert(vocab::compact(key), value.into());
        self.meta_changed();
        self
    }

    pub(super) fn meta_changed(&self) {
        {
            let mut meta = self.inner.meta.lock();
            meta.timestamp = Some(timestamp::advance(meta.timestamp.as_ref()));
        }
        self.queue(Notification::Meta);
    }

    pub(super) fn meta_band(&self) -> Map<String, Value> {
        let bridge = self.bridge();
        let mut band = bridge.as_ref().map(|b| b.meta()).unwrap_or_default();
        let reachable = bridge.is_some_and(|b| b.reachable());

        let meta = self.inner.meta.lock();
        band.extend(meta.overrides.clone());
        band.insert(
            keys::THING_ID.into(),
            meta.thing_id.clone().map(Value::String).unwrap_or(Value::Null),
        );
        band.insert(
            keys::MODEL_ID.into(),
            Value::String(self.inner.model.code().to_string()),
        );
        band.insert(keys::REACHABLE.into(), Value::Bool(reachable));
        band.insert(
            keys::TIMESTAMP.into(),
            meta.timestamp
                .as_ref()
                .map(|ts| Value::String(timestamp::to_iso(ts)))
                .unwrap_or(Value::Null),
        );
        band
    }
}
