//! Thing State Engine Tests
//!
//! Covers band merging, staleness, idempotence and deferred notification.

use std::sync::Arc;

use chrono::Duration;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use thingmesh_core::timestamp;
use thingmesh_core::vocab::keys;
use thingmesh_things::{
    Band, MockBridge, PushBehavior, StateBand, ThingEvent, Topic, UpdateOptions,
};

mod common;
use common::{lamp, record, settle, values};

#[tokio::test]
async fn test_get_prefers_istate_over_ostate() {
    let thing = lamp();
    let bridge = Arc::new(MockBridge::new("lamp").with_behavior(PushBehavior::Manual));
    thing.bind_bridge(bridge);

    thing.set("brightness", 40);
    assert_eq!(thing.get("brightness"), Some(json!(40)));

    thing.update(
        Band::Istate,
        values(json!({"brightness": 10})),
        UpdateOptions::default(),
    );
    assert_eq!(thing.get("brightness"), Some(json!(10)));
    // Each band only moves through its own updates
    assert_eq!(thing.state(StateBand::Ostate)["brightness"], json!(40));

    thing.set("brightness", 60);
    assert_eq!(thing.state(StateBand::Istate)["brightness"], json!(10));
    assert_eq!(thing.get("nothing-here"), None);
    assert_eq!(thing.get("color"), Some(Value::Null));
}

#[tokio::test]
async fn test_ostate_is_validated() {
    let thing = lamp();
    thing.bind_bridge(Arc::new(
        MockBridge::new("lamp").with_behavior(PushBehavior::Manual),
    ));

    thing.set("brightness", 250).set("color", "red");
    let ostate = thing.state(StateBand::Ostate);
    assert_eq!(ostate["brightness"], json!(100));
    assert_eq!(ostate["color"], json!("#FF0000"));

    // Rejected values are dropped from the batch
    thing.set("color", "not a color");
    assert_eq!(thing.state(StateBand::Ostate)["color"], json!("#FF0000"));
}

#[tokio::test]
async fn test_istate_stores_raw_values_by_default() {
    let thing = lamp();
    thing.update(
        Band::Istate,
        values(json!({"brightness": "bright", "ghost": 1})),
        UpdateOptions::default(),
    );
    let istate = thing.state(StateBand::Istate);
    assert_eq!(istate["brightness"], json!("bright"));
    assert!(istate.get("ghost").is_none());
}

#[tokio::test]
async fn test_stale_batch_is_rejected_whole() {
    let thing = lamp();
    let t1 = timestamp::parse("2024-05-01T12:00:00Z").unwrap();

    assert!(thing.update(
        Band::Istate,
        values(json!({"on-value": true, "brightness": 5})),
        UpdateOptions::new().at(t1),
    ));
    assert!(!thing.update(
        Band::Istate,
        values(json!({"on-value": false, "brightness": 6})),
        UpdateOptions::new().at(t1 - Duration::seconds(1)),
    ));
    assert_eq!(thing.get("on-value"), Some(json!(true)));
    assert_eq!(thing.get("brightness"), Some(json!(5)));

    assert!(thing.update(
        Band::Istate,
        values(json!({"brightness": 6})),
        UpdateOptions::new()
            .at(t1 - Duration::seconds(1))
            .ignore_timestamp(),
    ));
    assert_eq!(
        thing.state(StateBand::Istate)[keys::TIMESTAMP],
        json!("2024-05-01T11:59:59.000Z")
    );
}

#[tokio::test]
async fn test_identical_update_neither_notifies_nor_pushes() {
    let thing = lamp();
    let bridge = Arc::new(MockBridge::new("lamp").with_behavior(PushBehavior::Manual));
    thing.bind_bridge(bridge.clone());
    let log = record(&thing, &["brightness"], &[Topic::Ostate]);

    let t1 = timestamp::now();
    let batch = values(json!({"brightness": 50}));
    assert!(thing.update(Band::Ostate, batch.clone(), UpdateOptions::new().at(t1)));
    assert!(!thing.update(Band::Ostate, batch.clone(), UpdateOptions::new().at(t1)));
    assert!(!thing.update(
        Band::Ostate,
        batch,
        UpdateOptions::new().at(t1 + Duration::seconds(1))
    ));
    settle().await;

    assert_eq!(bridge.push_count(), 1);
    assert_eq!(*log.lock(), vec!["brightness=50", "ostate"]);
}

#[tokio::test]
async fn test_cleared_ostate_accepts_same_value_again() {
    let thing = lamp();
    let bridge = Arc::new(MockBridge::new("lamp"));
    thing.bind_bridge(bridge.clone());

    thing.set("brightness", 30);
    settle().await;
    assert_eq!(bridge.push_count(), 1);
    assert_eq!(thing.state(StateBand::Ostate)["brightness"], Value::Null);

    thing.set("brightness", 30);
    settle().await;
    assert_eq!(bridge.push_count(), 2);
}

#[tokio::test]
async fn test_force_reapplies_unchanged_values() {
    let thing = lamp();
    let log = record(&thing, &["brightness"], &[]);
    let batch = values(json!({"brightness": 30}));

    assert!(thing.update(Band::Istate, batch.clone(), UpdateOptions::default()));
    assert!(!thing.update(Band::Istate, batch.clone(), UpdateOptions::default()));
    assert!(thing.update(Band::Istate, batch, UpdateOptions::new().force()));
    settle().await;
    assert_eq!(*log.lock(), vec!["brightness=30", "brightness=30"]);
}

#[tokio::test]
async fn test_notifications_are_deferred() {
    let thing = lamp();
    let log = record(&thing, &[":on"], &[Topic::Istate, Topic::State]);

    thing.update(
        Band::Istate,
        values(json!({"on-value": true})),
        UpdateOptions::default(),
    );
    assert!(log.lock().is_empty());

    settle().await;
    assert_eq!(*log.lock(), vec!["on-value=true", "istate", "state"]);
}

#[tokio::test]
async fn test_silent_update_skips_listeners() {
    let thing = lamp();
    let log = record(&thing, &["brightness"], &[Topic::Istate]);
    thing.update(
        Band::Istate,
        values(json!({"brightness": 1})),
        UpdateOptions::new().silent(),
    );
    settle().await;
    assert!(log.lock().is_empty());
    assert_eq!(thing.get("brightness"), Some(json!(1)));
}

#[tokio::test]
async fn test_listener_may_set_from_callback() {
    let thing = lamp();
    let bridge = Arc::new(MockBridge::new("lamp").with_behavior(PushBehavior::Manual));
    thing.bind_bridge(bridge.clone());
    thing.on("on-value", |thing, _, value| {
        thing.set(":on", value.clone());
    });

    thing.update(
        Band::Istate,
        values(json!({"on-value": true})),
        UpdateOptions::default(),
    );
    settle().await;
    assert_eq!(thing.state(StateBand::Ostate)["on"], json!(true));
    assert_eq!(bridge.pushes()[0]["on"], json!(true));
}

#[tokio::test]
async fn test_panicking_listener_is_contained() {
    let thing = lamp();
    let seen = Arc::new(Mutex::new(0));
    thing.on("brightness", |_, _, _| panic!("listener failure"));
    {
        let seen = seen.clone();
        thing.on("brightness", move |_, _, _| *seen.lock() += 1);
    }

    for level in [1, 2] {
        thing.update(
            Band::Istate,
            values(json!({"brightness": level})),
            UpdateOptions::default(),
        );
    }
    settle().await;
    assert_eq!(*seen.lock(), 2);
}

#[tokio::test]
async fn test_event_stream() {
    let thing = lamp();
    let mut rx = thing.subscribe();
    thing.update(
        Band::Istate,
        values(json!({"brightness": 7})),
        UpdateOptions::default(),
    );

    match rx.recv().await {
        Some(ThingEvent::AttributeChanged {
            code, band, value, ..
        }) => {
            assert_eq!(code, "brightness");
            assert_eq!(band, Band::Istate);
            assert_eq!(value, json!(7));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(matches!(
        rx.recv().await,
        Some(ThingEvent::TopicChanged { topic: Topic::Istate, .. })
    ));
    assert!(matches!(
        rx.recv().await,
        Some(ThingEvent::TopicChanged { topic: Topic::State, .. })
    ));
}

#[tokio::test]
async fn test_event_stream_filters_by_topic() {
    let thing = lamp();
    let stream = thing
        .subscribe()
        .into_stream()
        .filter(|event| futures::future::ready(event.concerns(Topic::Istate)));
    tokio::pin!(stream);

    thing.update(
        Band::Istate,
        values(json!({"brightness": 3, "color": "#FFFFFF"})),
        UpdateOptions::default(),
    );

    let events: Vec<ThingEvent> = stream.take(3).collect().await;
    assert!(events[..2].iter().all(ThingEvent::is_attribute_event));
    assert!(matches!(
        events[2],
        ThingEvent::TopicChanged { topic: Topic::Istate, .. }
    ));
}

#[tokio::test]
async fn test_model_band() {
    let thing = lamp();
    let model = thing.state(StateBand::Model);
    assert_eq!(model[keys::ID], json!("lamp"));
    assert_eq!(model["brightness"]["iot:maximum"], json!(100));
}
