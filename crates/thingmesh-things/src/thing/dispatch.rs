//! Deferred notification delivery.
//!
//! Each Thing owns one queue and one dispatcher task. Notifications are
//! delivered in the order they were queued, always after the call that
//! queued them has returned.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::events::{AttributeCallback, Band, ThingEvent, Topic, TopicCallback};

use super::{Thing, ThingInner};

/// A change waiting to be delivered.
#[derive(Debug)]
pub(super) enum Notification {
    /// Values changed in a band. `combined` also raises [`Topic::State`].
    Band {
        band: Band,
        changes: Vec<(usize, Value)>,
        combined: bool,
    },
    Meta,
}

#[derive(Default)]
pub(super) struct Listeners {
    pub attributes: HashMap<usize, Vec<AttributeCallback>>,
    pub topics: HashMap<Topic, Vec<TopicCallback>>,
}

/// Drain the queue until the Thing is dropped.
pub(super) async fn run(thing: Weak<ThingInner>, mut rx: mpsc::UnboundedReceiver<Notification>) {
    while let Some(notification) = rx.recv().await {
        let Some(inner) = thing.upgrade() else {
            break;
        };
        Thing { inner }.deliver(notification);
    }
    debug!("Thing dispatcher stopped");
}

impl Thing {
    pub(super) fn queue(&self, notification: Notification) {
        if self.inner.queue.send(notification).is_err() {
            debug!(thing_id = ?self.thing_id(), "Dispatcher gone, dropping notification");
        }
    }

    fn deliver(&self, notification: Notification) {
        let thing_id = self.thing_id();
        let now = chrono::Utc::now().timestamp_millis();

        let topics = match notification {
            Notification::Band {
                band,
                changes,
                combined,
            } => {
                for (index, value) in &changes {
                    let attribute = &self.attributes()[*index];
                    let callbacks = self
                        .inner
                        .listeners
                        .read()
                        .attributes
                        .get(index)
                        .cloned()
                        .unwrap_or_default();
                    for callback in callbacks {
                        guarded("attribute", || callback(self, attribute, value));
                    }
                    self.inner.events.publish(ThingEvent::AttributeChanged {
                        thing_id: thing_id.clone(),
                        code: attribute.code().to_string(),
                        band,
                        value: value.clone(),
                        timestamp: now,
                    });
                }
                if combined {
                    vec![Topic::from(band), Topic::State]
                } else {
                    vec![Topic::from(band)]
                }
            }
            Notification::Meta => vec![Topic::Meta],
        };

        for topic in topics {
            let callbacks = self
                .inner
                .listeners
                .read()
                .topics
                .get(&topic)
                .cloned()
                .unwrap_or_default();
            for callback in callbacks {
                guarded("topic", || callback(self, topic));
            }
            self.inner.events.publish(ThingEvent::TopicChanged {
                thing_id: thing_id.clone(),
                topic,
                timestamp: now,
            });
        }
    }
}

fn guarded(kind: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(listener = kind, "Listener panicked");
    }
}

pub(super) type WeakThing = Weak<ThingInner>;

impl Thing {
    pub(super) fn downgrade(&self) -> WeakThing {
        Arc::downgrade(&self.inner)
    }

    pub(super) fn upgrade(weak: &WeakThing) -> Option<Thing> {
        weak.upgrade().map(|inner| Thing { inner })
    }
}
