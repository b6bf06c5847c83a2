//! Thing - a live instance of a Model.
//!
//! A Thing keeps two value bands per attribute. The input band (`istate`)
//! holds what the device last reported; the output band (`ostate`) holds
//! what the application asked for and the bridge has not yet confirmed.
//!
//! Changes are applied synchronously under a lock, but every notification
//! is queued to a per-Thing dispatcher task. Listeners therefore always run
//! after the mutating call returns, and may call back into the Thing.
//!
//! ```no_run
//! use std::sync::Arc;
//! use thingmesh_things::{Attribute, Model, StateBand, ThingFactory};
//! use thingmesh_core::EngineConfig;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let model = Model::builder("lamp")
//!     .attribute(Attribute::from_purpose(":on").boolean().control().build()?)
//!     .build()?;
//! let factory = ThingFactory::new(Arc::new(model), EngineConfig::default())?;
//! let thing = factory.make();
//!
//! thing.on(":on", |_, attribute, value| {
//!     println!("{} is now {}", attribute.code(), value);
//! });
//! thing.set(":on", true);
//! println!("{:?}", thing.state(StateBand::Ostate));
//! # Ok(())
//! # }
//! ```

mod binding;
mod dispatch;
mod meta;
mod push;
mod state;

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use thingmesh_core::timestamp::{self, Timestamp};
use thingmesh_core::vocab::keys;
use thingmesh_core::EngineConfig;

use crate::attribute::Attribute;
use crate::events::{Band, EventBus, EventReceiver, StateBand, Topic};
use crate::find::{self, FindKey, Intent};
use crate::format::ValidateOptions;
use crate::model::Model;

use self::binding::Binding;
use self::dispatch::{Listeners, Notification};
use self::meta::MetaState;
use self::state::{Rejected, ThingState};

/// Options for [`Thing::update`].
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOptions {
    /// Timestamp of the batch. Falls back to the `@timestamp` entry of the
    /// values, then to the current time.
    pub timestamp: Option<Timestamp>,
    /// Validate values before merging. Defaults to the engine setting for
    /// the band.
    pub validate: Option<bool>,
    /// Treat values equal to the current ones as changes
    pub force: bool,
    /// Queue notifications for the applied changes
    pub notify: bool,
    /// Reject batches whose timestamp is not newer than the band's
    pub check_timestamp: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            timestamp: None,
            validate: None,
            force: false,
            notify: true,
            check_timestamp: true,
        }
    }
}

impl UpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = Some(validate);
        self
    }

    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn silent(mut self) -> Self {
        self.notify = false;
        self
    }

    pub fn ignore_timestamp(mut self) -> Self {
        self.check_timestamp = false;
        self
    }
}

/// Cheap-clone handle to a live Thing.
#[derive(Clone)]
pub struct Thing {
    inner: Arc<ThingInner>,
}

struct ThingInner {
    model: Arc<Model>,
    config: EngineConfig,
    state: Mutex<ThingState>,
    meta: Mutex<MetaState>,
    binding: RwLock<Option<Binding>>,
    listeners: RwLock<Listeners>,
    queue: mpsc::UnboundedSender<Notification>,
    events: EventBus,
}

impl Thing {
    /// Create an unbound Thing with empty bands.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime; the notification
    /// dispatcher is spawned here.
    pub fn new(model: Arc<Model>, config: EngineConfig) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(ThingInner {
            state: Mutex::new(ThingState::new(model.len())),
            meta: Mutex::new(MetaState::default()),
            binding: RwLock::new(None),
            listeners: RwLock::new(Listeners::default()),
            events: EventBus::with_capacity(config.event_capacity),
            queue,
            model,
            config,
        });
        tokio::spawn(dispatch::run(Arc::downgrade(&inner), rx));
        Self { inner }
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.inner.model
    }

    pub fn attributes(&self) -> &[Attribute] {
        self.inner.model.attributes()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Pushes handed to (or waiting for) the bridge and not yet completed.
    pub fn pushes_in_flight(&self) -> usize {
        self.inner.state.lock().pushes
    }

    /// Resolve a key to an attribute of this Thing.
    pub fn find(&self, key: impl Into<FindKey>, intent: Intent) -> Option<&Attribute> {
        self.inner.model.find(&key.into(), intent)
    }

    fn resolve(&self, key: &FindKey, intent: Intent) -> Option<usize> {
        let index = find::resolve(&self.inner.model, key, intent);
        if index.is_none() {
            warn!(
                thing_id = ?self.thing_id(),
                model = %self.inner.model.code(),
                key = %key,
                "Attribute not found"
            );
        }
        index
    }

    /// Current value of an attribute: observed, else requested, else null.
    ///
    /// Returns `None` only when the key does not resolve.
    pub fn get(&self, key: impl Into<FindKey>) -> Option<Value> {
        let index = self.resolve(&key.into(), Intent::Get)?;
        Some(self.inner.state.lock().effective(index))
    }

    /// Request a new value for an attribute.
    ///
    /// The value is validated into the output band and pushed to the bound
    /// bridge. An unresolvable key is logged and ignored.
    pub fn set(&self, key: impl Into<FindKey>, value: impl Into<Value>) -> &Self {
        let Some(index) = self.resolve(&key.into(), Intent::Set) else {
            return self;
        };
        let mut values = Map::new();
        values.insert(self.attributes()[index].code().to_string(), value.into());
        self.update(Band::Ostate, values, UpdateOptions::default());
        self
    }

    /// Merge `values`, keyed by attribute code, into a band.
    ///
    /// The batch is applied whole or not at all. Returns `true` when at
    /// least one value changed. Output band changes are pushed to the bound
    /// bridge.
    pub fn update(&self, band: Band, values: Map<String, Value>, options: UpdateOptions) -> bool {
        let model = &self.inner.model;
        let validate = options.validate.unwrap_or(match band {
            Band::Istate => self.inner.config.validate_istate,
            Band::Ostate => self.inner.config.validate_ostate,
        });

        let mut ts = options.timestamp;
        let mut batch = Vec::with_capacity(values.len());
        for (code, value) in values {
            if code == keys::TIMESTAMP {
                if ts.is_none() {
                    ts = value.as_str().and_then(timestamp::parse);
                    if ts.is_none() {
                        warn!(value = %value, "Ignoring unparsable @timestamp");
                    }
                }
                continue;
            }
            let Some(index) = model.position(&code) else {
                warn!(model = %model.code(), code = %code, band = ?band, "Ignoring unknown attribute");
                continue;
            };
            let value = if validate {
                match model.attributes()[index].validate(value.clone(), &ValidateOptions::default()) {
                    Some(valid) => valid,
                    None => {
                        debug!(code = %code, value = %value, band = ?band, "Dropping value rejected by validation");
                        continue;
                    }
                }
            } else {
                value
            };
            batch.push((index, value));
        }

        let target = match band {
            Band::Ostate => self.push_target(),
            Band::Istate => None,
        };
        let (changes, plan) = {
            let mut state = self.inner.state.lock();
            let merged = state.merge(band, batch, ts, options.check_timestamp, options.force);
            match merged {
                Ok(changes) => {
                    let plan = match band {
                        Band::Ostate => Some(self.plan_push(&mut state, target, &changes)),
                        Band::Istate => None,
                    };
                    (changes, plan)
                }
                Err(Rejected::Stale) => {
                    drop(state);
                    debug!(thing_id = ?self.thing_id(), band = ?band, "Rejecting stale update");
                    return false;
                }
                Err(Rejected::Unchanged) => return false,
            }
        };

        if options.notify {
            self.queue(Notification::Band {
                band,
                changes,
                combined: true,
            });
        }
        if let Some(plan) = plan {
            self.follow_push(plan);
        }
        true
    }

    /// Render a band as a map keyed by attribute code, with `@timestamp`.
    pub fn state(&self, band: StateBand) -> Map<String, Value> {
        match band {
            StateBand::Istate => self.inner.state.lock().band(&self.inner.model, Band::Istate),
            StateBand::Ostate => self.inner.state.lock().band(&self.inner.model, Band::Ostate),
            StateBand::Meta => self.meta_band(),
            StateBand::Model => self.inner.model.state(),
        }
    }

    /// Call `callback` whenever the resolved attribute changes in either band.
    pub fn on<F>(&self, key: impl Into<FindKey>, callback: F) -> &Self
    where
        F: Fn(&Thing, &Attribute, &Value) + Send + Sync + 'static,
    {
        if let Some(index) = self.resolve(&key.into(), Intent::On) {
            self.inner
                .listeners
                .write()
                .attributes
                .entry(index)
                .or_default()
                .push(Arc::new(callback));
        }
        self
    }

    /// Call `callback` whenever a band as a whole changes.
    pub fn on_topic<F>(&self, topic: Topic, callback: F) -> &Self
    where
        F: Fn(&Thing, Topic) + Send + Sync + 'static,
    {
        self.inner
            .listeners
            .write()
            .topics
            .entry(topic)
            .or_default()
            .push(Arc::new(callback));
        self
    }

    /// Subscribe to this Thing's event stream.
    pub fn subscribe(&self) -> EventReceiver {
        self.inner.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }
}

impl std::fmt::Debug for Thing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thing")
            .field("thing_id", &self.thing_id())
            .field("model", &self.inner.model.code())
            .finish_non_exhaustive()
    }
}
