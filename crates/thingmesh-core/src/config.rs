//! Engine configuration.
//!
//! Defaults live in [`defaults`]; every tunable can be overridden from the
//! environment through the helpers in [`env_vars`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config_err;
use crate::error::Result;

/// Default values.
pub mod defaults {
    /// Buffered events per Thing broadcast channel.
    pub const EVENT_CHANNEL_CAPACITY: usize = 256;
    /// Color used when a color value is rejected and a fallback is requested.
    pub const OTHERWISE_RGB: &str = "#000000";
    /// Quiet time reported when a Bridge has nothing to say about disconnect.
    pub const DISCONNECT_QUIET_SECS: f64 = 0.0;
    /// Whether observed-state updates are validated by default.
    pub const VALIDATE_ISTATE: bool = false;
    /// Whether desired-state updates are validated by default.
    pub const VALIDATE_OSTATE: bool = true;
}

/// Environment variable names and lookup helpers.
pub mod env_vars {
    use super::defaults;

    pub const LOG_JSON: &str = "THINGMESH_LOG_JSON";
    pub const EVENT_CAPACITY: &str = "THINGMESH_EVENT_CAPACITY";
    pub const PUSH_TIMEOUT_MS: &str = "THINGMESH_PUSH_TIMEOUT_MS";
    pub const VALIDATE_ISTATE: &str = "THINGMESH_VALIDATE_ISTATE";
    pub const VALIDATE_OSTATE: &str = "THINGMESH_VALIDATE_OSTATE";

    fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
        std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
    }

    /// Whether JSON log output is requested.
    pub fn log_json() -> bool {
        parsed(LOG_JSON).unwrap_or(false)
    }

    pub fn event_capacity() -> usize {
        parsed(EVENT_CAPACITY).unwrap_or(defaults::EVENT_CHANNEL_CAPACITY)
    }

    /// Push timeout in milliseconds; unset means pushes wait forever.
    pub fn push_timeout_ms() -> Option<u64> {
        parsed(PUSH_TIMEOUT_MS)
    }

    pub fn validate_istate() -> bool {
        parsed(VALIDATE_ISTATE).unwrap_or(defaults::VALIDATE_ISTATE)
    }

    pub fn validate_ostate() -> bool {
        parsed(VALIDATE_OSTATE).unwrap_or(defaults::VALIDATE_OSTATE)
    }
}

/// Per-Thing engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Validate values merged into the input band
    pub validate_istate: bool,
    /// Validate values merged into the output band
    pub validate_ostate: bool,
    /// Give up on a Bridge push after this many milliseconds
    pub push_timeout_ms: Option<u64>,
    /// Capacity of the Thing event broadcast channel
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            validate_istate: defaults::VALIDATE_ISTATE,
            validate_ostate: defaults::VALIDATE_OSTATE,
            push_timeout_ms: None,
            event_capacity: defaults::EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Build a configuration from defaults plus `THINGMESH_*` overrides.
    pub fn from_env() -> Self {
        Self {
            validate_istate: env_vars::validate_istate(),
            validate_ostate: env_vars::validate_ostate(),
            push_timeout_ms: env_vars::push_timeout_ms(),
            event_capacity: env_vars::event_capacity(),
        }
    }

    pub fn with_push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn push_timeout(&self) -> Option<Duration> {
        self.push_timeout_ms.map(Duration::from_millis)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(config_err!("event_capacity must be positive"));
        }
        if self.push_timeout_ms == Some(0) {
            return Err(config_err!(
                "push_timeout_ms must be positive when set, got {:?}",
                self.push_timeout_ms
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(!config.validate_istate);
        assert!(config.validate_ostate);
        assert_eq!(config.push_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"push_timeout_ms": 1500}"#).unwrap();
        assert_eq!(config.push_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.event_capacity, defaults::EVENT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_rejects_zero_values() {
        let config = EngineConfig {
            event_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            push_timeout_ms: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
