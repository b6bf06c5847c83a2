//! Thing Engine Example
//!
//! Demonstrates:
//! 1. Defining a model with the attribute builder
//! 2. Discovering devices through a bridge
//! 3. Reading device reports and requesting changes

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use thingmesh_core::logging::init_logging;
use thingmesh_core::EngineConfig;
use thingmesh_things::{
    Attribute, MockBridge, Model, PushBehavior, StateBand, ThingFactory, Topic,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(false);
    println!("=== Thingmesh Demo ===\n");

    // === Example 1: Define a model ===
    println!("--- Example 1: Define a model ---");
    let model = Model::builder("dimmer")
        .name("Dimmer")
        .attribute(Attribute::from_purpose(":on").boolean().control().build()?)
        .attribute(
            Attribute::from_purpose(":on")
                .code("on-value")
                .boolean()
                .reading()
                .build()?,
        )
        .attribute(
            Attribute::from_purpose(":brightness")
                .integer()
                .minimum(0.0)
                .maximum(100.0)
                .build()?,
        )
        .build()?;
    println!("{}\n", serde_json::to_string_pretty(&model.state())?);

    // === Example 2: Discover devices ===
    println!("--- Example 2: Discover devices ---");
    let device = Arc::new(
        MockBridge::new("dimmer-1")
            .with_thing_id("urn:demo:dimmer:1")
            .with_behavior(PushBehavior::Manual),
    );
    let hub = Arc::new(MockBridge::new("hub").with_device(device.clone()));
    let factory = ThingFactory::new(model, EngineConfig::from_env())?;
    let things: Vec<_> = factory.discover(hub).collect().await;
    let thing = things.into_iter().next().ok_or("nothing discovered")?;
    println!("Discovered {:?}\n", thing.thing_id());

    thing.on(":on", |thing, attribute, value| {
        println!("  {} reported {} by {:?}", attribute.code(), value, thing.thing_id());
    });
    thing.on_topic(Topic::Ostate, |thing, _| {
        println!("  ostate now {}", json!(thing.state(StateBand::Ostate)));
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // === Example 3: Device reports ===
    println!("--- Example 3: Device reports ---");
    let report = json!({"on-value": true, "brightness": 20});
    device.emit(report.as_object().cloned());
    tokio::time::sleep(Duration::from_millis(20)).await;
    println!("istate: {}\n", json!(thing.state(StateBand::Istate)));

    // === Example 4: Request changes ===
    println!("--- Example 4: Request changes ---");
    thing.set(":on", false).set(":brightness", 250);
    tokio::time::sleep(Duration::from_millis(20)).await;
    println!("pushed: {:?}", device.pushes());
    device.complete_next(Ok(()));
    tokio::time::sleep(Duration::from_millis(20)).await;

    println!("\nquiet in {}s", thing.disconnect().await);
    Ok(())
}
