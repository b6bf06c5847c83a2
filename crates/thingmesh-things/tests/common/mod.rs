//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use thingmesh_core::EngineConfig;
use thingmesh_things::{Attribute, Model, Thing, ThingFactory, Topic};

/// A dimmable lamp: control and reading attributes for `:on`, a bounded
/// brightness and a color.
pub fn lamp_model() -> Arc<Model> {
    let model = Model::builder("lamp")
        .name("Lamp")
        .attribute(
            Attribute::from_purpose(":on")
                .boolean()
                .control()
                .build()
                .unwrap(),
        )
        .attribute(
            Attribute::from_purpose(":on")
                .code("on-value")
                .boolean()
                .reading()
                .build()
                .unwrap(),
        )
        .attribute(
            Attribute::from_purpose(":brightness")
                .integer()
                .minimum(0.0)
                .maximum(100.0)
                .unit("iot-unit:math.fraction.percent")
                .build()
                .unwrap(),
        )
        .attribute(
            Attribute::from_purpose(":color")
                .string()
                .color()
                .value_map("#FFFFFF", "white")
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    Arc::new(model)
}

pub fn lamp() -> Thing {
    factory(EngineConfig::default()).make()
}

pub fn factory(config: EngineConfig) -> ThingFactory {
    ThingFactory::new(lamp_model(), config).unwrap()
}

pub fn values(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("object literal")
}

/// Let spawned tasks and the dispatcher run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(25)).await;
}

/// Records `code=value` for every attribute change and the topic name for
/// every band change.
pub fn record(thing: &Thing, keys: &[&str], topics: &[Topic]) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for key in keys {
        let log = log.clone();
        thing.on(*key, move |_, attribute, value| {
            log.lock().push(format!("{}={}", attribute.code(), value));
        });
    }
    for topic in topics {
        let log = log.clone();
        thing.on_topic(*topic, move |_, topic| log.lock().push(topic.to_string()));
    }
    log
}
