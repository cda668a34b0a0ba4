//! The configuration value handed over by the external loader
//!
//! Validation happens synchronously, before any backend is touched;
//! this is the only error class surfaced as a conventional error
//! return.

use serde::{Deserialize, Serialize};

use crate::core::error::{DeliveryError, Result};
use crate::core::severity::Severity;

/// Severity names the broker section accepts.
const BROKER_LEVELS: &[&str] = &["Critical", "Warning", "Information", "Debug", "ExtraDebug1"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub basic: BasicConfig,
    pub broker: BrokerConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicConfig {
    /// Discard console output entirely.
    pub disable_console: bool,
    /// Mirror console messages to the extra console stream.
    pub extra_console: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub enabled: bool,
    pub default_level: String,
    pub topic: String,
    pub brokers: Vec<String>,
}

impl Config {
    /// Reject malformed settings before anything is applied.
    pub fn validate(&self) -> Result<()> {
        if !self.broker.enabled {
            return Ok(());
        }

        if self.broker.default_level.is_empty() {
            return Err(DeliveryError::config(
                "broker",
                "defaultLevel must be set when the broker is enabled",
            ));
        }
        if !BROKER_LEVELS
            .iter()
            .any(|name| name.eq_ignore_ascii_case(&self.broker.default_level))
        {
            return Err(DeliveryError::config(
                "broker",
                format!(
                    "defaultLevel '{}' is not one of {}",
                    self.broker.default_level,
                    BROKER_LEVELS.join(", ")
                ),
            ));
        }
        if self.broker.brokers.is_empty() {
            return Err(DeliveryError::config(
                "broker",
                "at least one broker endpoint is required",
            ));
        }
        if self.broker.topic.is_empty() {
            return Err(DeliveryError::config("broker", "topic must not be empty"));
        }
        Ok(())
    }
}

impl BrokerConfig {
    /// The broker's severity floor. Call after validation.
    pub fn level(&self) -> Severity {
        self.default_level.parse().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_config() -> Config {
        Config {
            broker: BrokerConfig {
                enabled: true,
                default_level: "Information".into(),
                topic: "logs".into(),
                brokers: vec!["broker-1:9092".into()],
            },
            ..Config::default()
        }
    }

    #[test]
    fn test_disabled_broker_needs_nothing() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_valid_enabled_config() {
        assert!(enabled_config().validate().is_ok());
    }

    #[test]
    fn test_missing_level_rejected() {
        let mut cfg = enabled_config();
        cfg.broker.default_level = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_unknown_level_rejected() {
        let mut cfg = enabled_config();
        cfg.broker.default_level = "Extreme".into();
        assert!(cfg.validate().is_err());

        cfg.broker.default_level = "Verbose".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_no_endpoints_rejected() {
        let mut cfg = enabled_config();
        cfg.broker.brokers.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_empty_topic_rejected() {
        let mut cfg = enabled_config();
        cfg.broker.topic = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_level_parses() {
        assert_eq!(enabled_config().broker.level(), Severity::Information);
    }

    #[test]
    fn test_deserializes_with_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"broker":{"enabled":false}}"#).unwrap();
        assert!(!cfg.broker.enabled);
        assert!(!cfg.basic.disable_console);
    }
}
