//! Key Resolution Tests
//!
//! Covers lookups by code, by semantic purpose and by predicate, and the
//! aliasing behavior seen through `Thing::set`.

use std::sync::Arc;

use serde_json::{json, Value};
use thingmesh_core::EngineConfig;
use thingmesh_things::{
    Attribute, FindKey, Intent, MockBridge, Model, Predicate, PushBehavior, StateBand,
    ThingFactory,
};

mod common;
use common::{lamp_model, settle};

#[test]
fn test_purpose_prefers_role_by_intent() {
    let model = lamp_model();
    let key = FindKey::parse(":on");
    assert_eq!(model.find(&key, Intent::Set).unwrap().code(), "on");
    assert_eq!(model.find(&key, Intent::Get).unwrap().code(), "on-value");
    assert_eq!(model.find(&key, Intent::On).unwrap().code(), "on-value");
    assert_eq!(model.find(&key, Intent::Any).unwrap().code(), "on");
}

#[test]
fn test_prefixed_and_full_iri() {
    let model = lamp_model();
    for key in [
        "iot-purpose:brightness",
        "https://iotdb.org/pub/iot-purpose#brightness",
    ] {
        assert_eq!(
            model.find(&key.into(), Intent::Get).unwrap().code(),
            "brightness",
            "{key}"
        );
    }
    assert!(model.find(&":volume".into(), Intent::Get).is_none());
}

#[test]
fn test_predicate_lookup() {
    let model = lamp_model();
    let key: FindKey = Predicate::purpose(":brightness")
        .with("unit", "iot-unit:math.fraction.percent")
        .into();
    assert_eq!(model.find(&key, Intent::Any).unwrap().code(), "brightness");

    let key: FindKey = Predicate::purpose(":brightness")
        .with("unit", "iot-unit:temperature.si.kelvin")
        .into();
    assert!(model.find(&key, Intent::Any).is_none());
}

fn aliased_model() -> Arc<Model> {
    Arc::new(
        Model::builder("plug")
            .attribute(
                Attribute::from_purpose(":on")
                    .code("powered")
                    .boolean()
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap(),
    )
}

#[tokio::test]
async fn test_aliased_code_and_purpose_share_a_slot() {
    let factory = ThingFactory::new(aliased_model(), EngineConfig::default()).unwrap();
    let bridge = Arc::new(MockBridge::new("plug").with_behavior(PushBehavior::Manual));
    let thing = factory.make_bound(bridge.clone());
    settle().await;

    thing.set("powered", true);
    assert_eq!(thing.state(StateBand::Ostate)["powered"], json!(true));

    thing.set(":on", false);
    assert_eq!(thing.state(StateBand::Ostate)["powered"], json!(false));

    // The bare code no longer names any attribute
    thing.set("on", true);
    assert_eq!(thing.state(StateBand::Ostate)["powered"], json!(false));
    assert_eq!(thing.get("on"), None);
    assert_eq!(thing.get(":on"), Some(json!(false)));

    settle().await;
    assert_eq!(bridge.pushes(), vec![json!({"powered": false})
        .as_object()
        .cloned()
        .unwrap()]);
    assert!(bridge.complete_next(Ok(())));
    settle().await;
    assert_eq!(thing.state(StateBand::Ostate)["powered"], Value::Null);
}
