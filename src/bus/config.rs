//! Configuration for the event bus.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default replay cache time-to-live
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(60_000);

/// Configuration for the event bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Cache the last payload per event for replay to late subscribers
    pub cache_enabled: bool,

    /// How long a cached payload stays eligible for replay; zero selects
    /// [`DEFAULT_CACHE_TTL`]
    #[serde(rename = "cache_ttl_ms", with = "duration_ms")]
    pub cache_ttl: Duration,

    /// Upper bound on subscribers per event; `None` means unbounded
    pub max_subscribers_per_event: Option<usize>,

    /// Number of events the default registry pre-allocates for
    pub registry_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl: DEFAULT_CACHE_TTL,
            max_subscribers_per_event: None,
            registry_capacity: 100,
        }
    }
}

impl EventBusConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::ConfigError(e.to_string()))
    }

    /// Enable or disable the replay cache
    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Set the replay cache time-to-live
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Limit subscribers per event
    pub fn max_subscribers_per_event(mut self, max: usize) -> Self {
        self.max_subscribers_per_event = Some(max);
        self
    }

    /// Set the registry pre-allocation
    pub fn registry_capacity(mut self, capacity: usize) -> Self {
        self.registry_capacity = capacity;
        self
    }

    /// The TTL the replay cache uses: `cache_ttl`, or the default when zero
    pub fn effective_cache_ttl(&self) -> Duration {
        if self.cache_ttl.is_zero() {
            DEFAULT_CACHE_TTL
        } else {
            self.cache_ttl
        }
    }

    /// Check the configuration for values the bus cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.max_subscribers_per_event == Some(0) {
            return Err(Error::ConfigError(
                "max_subscribers_per_event must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Preset configurations for common use cases
impl EventBusConfig {
    /// Configuration without a replay cache
    pub fn no_cache() -> Self {
        Self::default().cache_enabled(false)
    }

    /// Configuration for testing: small registry, one second TTL
    pub fn test() -> Self {
        Self::default()
            .cache_ttl(Duration::from_secs(1))
            .registry_capacity(8)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EventBusConfig::default();
        assert!(config.cache_enabled);
        assert_eq!(config.cache_ttl, Duration::from_millis(60_000));
        assert_eq!(config.max_subscribers_per_event, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = EventBusConfig::from_json(r#"{"cache_ttl_ms": 1500}"#).unwrap();
        assert_eq!(config.cache_ttl, Duration::from_millis(1500));
        assert!(config.cache_enabled);

        let config = EventBusConfig::from_json(r#"{"cache_enabled": false}"#).unwrap();
        assert!(!config.cache_enabled);

        assert!(matches!(
            EventBusConfig::from_json(r#"{"cache_ttl_ms": "soon"}"#),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_serializes_ttl_as_millis() {
        let json = serde_json::to_value(EventBusConfig::test()).unwrap();
        assert_eq!(json["cache_ttl_ms"], 1000);
    }

    #[test]
    fn test_zero_ttl_selects_default() {
        let config = EventBusConfig::from_json(r#"{"cache_ttl_ms": 0}"#).unwrap();
        assert_eq!(config.cache_ttl, Duration::ZERO);
        assert_eq!(config.effective_cache_ttl(), DEFAULT_CACHE_TTL);
        assert_eq!(
            EventBusConfig::test().effective_cache_ttl(),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let config = EventBusConfig::new().max_subscribers_per_event(0);
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));
        assert!(EventBusConfig::no_cache().validate().is_ok());
    }
}
