//! Thing change notifications.
//!
//! Changes reach applications two ways: registered callbacks (see
//! [`Thing::on`](crate::Thing::on) and [`Thing::on_topic`](crate::Thing::on_topic))
//! and a broadcast [`EventBus`] that any number of tasks can subscribe to.
//! Both are driven from the same dispatcher, never from inside the call
//! that made the change.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::attribute::Attribute;
use crate::thing::Thing;

/// The two value bands of a Thing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    /// Values reported by the device
    Istate,
    /// Values requested by the application, pending delivery
    Ostate,
}

/// Bands readable through [`Thing::state`](crate::Thing::state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBand {
    Istate,
    Ostate,
    Meta,
    Model,
}

impl From<Band> for StateBand {
    fn from(band: Band) -> Self {
        match band {
            Band::Istate => Self::Istate,
            Band::Ostate => Self::Ostate,
        }
    }
}

/// Band-level notification topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Istate,
    Ostate,
    Meta,
    /// Either value band changed
    State,
}

impl From<Band> for Topic {
    fn from(band: Band) -> Self {
        match band {
            Band::Istate => Self::Istate,
            Band::Ostate => Self::Ostate,
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Istate => write!(f, "istate"),
            Self::Ostate => write!(f, "ostate"),
            Self::Meta => write!(f, "meta"),
            Self::State => write!(f, "state"),
        }
    }
}

/// Event published on a Thing's [`EventBus`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThingEvent {
    /// One attribute changed in a value band
    AttributeChanged {
        thing_id: Option<String>,
        code: String,
        band: Band,
        value: Value,
        timestamp: i64,
    },

    /// A band as a whole changed
    TopicChanged {
        thing_id: Option<String>,
        topic: Topic,
        timestamp: i64,
    },
}

impl ThingEvent {
    /// Get the thing ID for this event.
    pub fn thing_id(&self) -> Option<&str> {
        match self {
            Self::AttributeChanged { thing_id, .. } | Self::TopicChanged { thing_id, .. } => {
                thing_id.as_deref()
            }
        }
    }

    /// Get the timestamp for this event, in milliseconds.
    pub fn timestamp(&self) -> i64 {
        match self {
            Self::AttributeChanged { timestamp, .. } | Self::TopicChanged { timestamp, .. } => {
                *timestamp
            }
        }
    }

    pub fn is_attribute_event(&self) -> bool {
        matches!(self, Self::AttributeChanged { .. })
    }

    /// Whether the event concerns `topic`.
    pub fn concerns(&self, topic: Topic) -> bool {
        match self {
            Self::AttributeChanged { band, .. } => {
                Topic::from(*band) == topic || topic == Topic::State
            }
            Self::TopicChanged { topic: t, .. } => *t == topic,
        }
    }
}

/// Callback for a single attribute's changes.
pub type AttributeCallback = Arc<dyn Fn(&Thing, &Attribute, &Value) + Send + Sync>;

/// Callback for band-level changes.
pub type TopicCallback = Arc<dyn Fn(&Thing, Topic) + Send + Sync>;

/// Broadcast channel carrying [`ThingEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ThingEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified capacity.
    ///
    /// The capacity determines how many events are buffered for slow subscribers.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Get the number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish an event. Returns `true` if there was at least one subscriber.
    pub fn publish(&self, event: ThingEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Subscribe to all events.
    ///
    /// If the subscriber falls behind, older events are dropped.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            rx: self.tx.subscribe(),
        }
    }

    /// Subscribe to events matching a filter.
    pub fn subscribe_filtered<F>(&self, filter: F) -> FilteredReceiver<F>
    where
        F: Fn(&ThingEvent) -> bool + Send + 'static,
    {
        FilteredReceiver {
            rx: self.tx.subscribe(),
            filter,
        }
    }
}

/// Receiver for all events from the event bus.
pub struct EventReceiver {
    rx: broadcast::Receiver<ThingEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` once the Thing is gone.
    pub async fn recv(&mut self) -> Option<ThingEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<ThingEvent> {
        self.rx.try_recv().ok()
    }

    /// Turn the receiver into a stream of events.
    pub fn into_stream(mut self) -> impl futures::Stream<Item = ThingEvent> + Send {
        async_stream::stream! {
            while let Some(event) = self.recv().await {
                yield event;
            }
        }
    }
}

/// Receiver for filtered events from the event bus.
pub struct FilteredReceiver<F>
where
    F: Fn(&ThingEvent) -> bool + Send,
{
    rx: broadcast::Receiver<ThingEvent>,
    filter: F,
}

impl<F> FilteredReceiver<F>
where
    F: Fn(&ThingEvent) -> bool + Send,
{
    /// Receive the next event matching the filter.
    pub async fn recv(&mut self) -> Option<ThingEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if (self.filter)(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive a matching event without blocking.
    pub fn try_recv(&mut self) -> Option<ThingEvent> {
        while let Ok(event) = self.rx.try_recv() {
            if (self.filter)(&event) {
                return Some(event);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn changed(code: &str, band: Band) -> ThingEvent {
        ThingEvent::AttributeChanged {
            thing_id: Some("t1".into()),
            code: code.into(),
            band,
            value: json!(true),
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::with_capacity(8);
        assert!(!bus.publish(changed("on", Band::Istate)));

        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        assert!(bus.publish(changed("on", Band::Istate)));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.thing_id(), Some("t1"));
        assert!(event.is_attribute_event());
    }

    #[tokio::test]
    async fn test_filtered() {
        let bus = EventBus::with_capacity(8);
        let mut rx = bus.subscribe_filtered(|e| e.concerns(Topic::Ostate));
        bus.publish(changed("on", Band::Istate));
        bus.publish(changed("level", Band::Ostate));
        match rx.recv().await {
            Some(ThingEvent::AttributeChanged { code, .. }) => assert_eq!(code, "level"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_concerns_state() {
        assert!(changed("on", Band::Istate).concerns(Topic::State));
        let event = ThingEvent::TopicChanged {
            thing_id: None,
            topic: Topic::Meta,
            timestamp: 0,
        };
        assert!(event.concerns(Topic::Meta));
        assert!(!event.concerns(Topic::State));
    }

    #[test]
    fn test_serialize_tagged() {
        let value = serde_json::to_value(changed("on", Band::Ostate)).unwrap();
        assert_eq!(value["type"], "attribute_changed");
        assert_eq!(value["band"], "ostate");
    }
}
