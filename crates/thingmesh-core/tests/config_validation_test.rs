//! Configuration Validation Tests
//!
//! Covers defaults, environment overrides and rejection of unusable values.

use std::time::Duration;
use thingmesh_core::config::{defaults, env_vars, EngineConfig};
use thingmesh_core::Error;

#[test]
fn test_default_constants() {
    assert!(defaults::EVENT_CHANNEL_CAPACITY >= 16);
    assert_eq!(defaults::OTHERWISE_RGB, "#000000");
    assert!(!defaults::VALIDATE_ISTATE);
    assert!(defaults::VALIDATE_OSTATE);
    assert_eq!(defaults::DISCONNECT_QUIET_SECS, 0.0);
}

#[test]
fn test_env_overrides() {
    // Single test touches the environment to avoid races between tests
    std::env::set_var(env_vars::PUSH_TIMEOUT_MS, "2500");
    std::env::set_var(env_vars::EVENT_CAPACITY, "not-a-number");
    std::env::set_var(env_vars::VALIDATE_ISTATE, "true");

    let config = EngineConfig::from_env();
    assert_eq!(config.push_timeout(), Some(Duration::from_millis(2500)));
    // Unparsable values fall back to the default
    assert_eq!(config.event_capacity, defaults::EVENT_CHANNEL_CAPACITY);
    assert!(config.validate_istate);
    assert!(config.validate_ostate);

    std::env::remove_var(env_vars::PUSH_TIMEOUT_MS);
    std::env::remove_var(env_vars::EVENT_CAPACITY);
    std::env::remove_var(env_vars::VALIDATE_ISTATE);

    let config = EngineConfig::from_env();
    assert_eq!(config, EngineConfig::default());
}

#[test]
fn test_builder_style_timeout() {
    let config = EngineConfig::default().with_push_timeout(Duration::from_secs(3));
    assert_eq!(config.push_timeout_ms, Some(3000));
    assert!(config.validate().is_ok());
}

#[test]
fn test_serde_roundtrip_keeps_fields() {
    let config = EngineConfig {
        validate_istate: true,
        validate_ostate: false,
        push_timeout_ms: Some(10),
        event_capacity: 8,
    };
    let json = serde_json::to_value(&config).unwrap();
    assert_eq!(json["event_capacity"], 8);
    let back: EngineConfig = serde_json::from_value(json).unwrap();
    assert_eq!(back, config);
}

#[test]
fn test_rejections_are_config_errors() {
    let config = EngineConfig {
        push_timeout_ms: Some(0),
        ..Default::default()
    };
    match config.validate() {
        Err(Error::Config(message)) => assert!(message.contains("push_timeout_ms")),
        other => panic!("expected a config error, got {other:?}"),
    }
}
