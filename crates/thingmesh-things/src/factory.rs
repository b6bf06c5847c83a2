//! Turning a Model into live Things.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use tracing::{debug, info};

use thingmesh_core::{EngineConfig, Result};

use crate::bridge::{Bridge, BridgeEvent, BridgeSink};
use crate::model::Model;
use crate::thing::Thing;

/// Stream of bound Things produced by [`ThingFactory::discover`].
pub type Discovery = Pin<Box<dyn Stream<Item = Thing> + Send>>;

/// Produces independent Things sharing one immutable Model.
#[derive(Debug, Clone)]
pub struct ThingFactory {
    model: Arc<Model>,
    config: EngineConfig,
}

impl ThingFactory {
    pub fn new(model: impl Into<Arc<Model>>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            model: model.into(),
            config,
        })
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A fresh, unbound Thing with empty bands.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn make(&self) -> Thing {
        Thing::new(self.model.clone(), self.config.clone())
    }

    /// A fresh Thing bound to `bridge`.
    pub fn make_bound(&self, bridge: Arc<dyn Bridge>) -> Thing {
        let thing = self.make();
        thing.bind_bridge(bridge);
        thing
    }

    /// Run discovery on `bridge`, yielding a bound Thing for every device
    /// it reports.
    ///
    /// The stream ends once the bridge has finished discovering and dropped
    /// every copy of its sink.
    pub fn discover(&self, bridge: Arc<dyn Bridge>) -> Discovery {
        let factory = self.clone();
        let (sink, mut rx) = BridgeSink::channel();
        info!(model = %factory.model.code(), bridge = %bridge.name(), "Starting discovery");
        tokio::spawn(async move { bridge.discover(sink).await });

        Box::pin(async_stream::stream! {
            while let Some(event) = rx.recv().await {
                match event {
                    BridgeEvent::Discovered(found) => {
                        debug!(bridge = %found.name(), "Discovered device");
                        yield factory.make_bound(found);
                    }
                    BridgeEvent::Pulled(_) => {
                        debug!("Ignoring pulled values during discovery");
                    }
                }
            }
        })
    }
}
