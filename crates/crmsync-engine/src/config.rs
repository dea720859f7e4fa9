//! Engine configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crmsync_adapter::CrmPlatform;

use crate::events::SyncEventBus;
use crate::rate_limiter::{RateLimitConfig, RateLimiterRegistry};

fn default_batch_size() -> u32 {
    100
}

fn default_event_capacity() -> usize {
    256
}

fn default_sync_interval_secs() -> u64 {
    900
}

/// Deployment-level engine settings, deserialized from whatever config
/// layer the host application uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Records requested per list call when a connection does not
    /// override it.
    #[serde(default = "default_batch_size")]
    pub default_batch_size: u32,
    /// Event bus capacity per subscriber.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Seconds between scheduled full syncs.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    /// Per-platform quota overrides; unlisted platforms keep the
    /// published defaults.
    #[serde(default)]
    pub rate_limits: HashMap<CrmPlatform, RateLimitConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_batch_size: default_batch_size(),
            event_capacity: default_event_capacity(),
            sync_interval_secs: default_sync_interval_secs(),
            rate_limits: HashMap::new(),
        }
    }
}

impl EngineConfig {
    /// Build a limiter registry with these overrides applied.
    #[must_use]
    pub fn limiter_registry(&self) -> RateLimiterRegistry {
        let mut registry = RateLimiterRegistry::with_defaults();
        for (&platform, &config) in &self.rate_limits {
            registry.set_config(platform, config);
        }
        registry
    }

    /// Build an event bus sized from this config.
    #[must_use]
    pub fn event_bus(&self) -> SyncEventBus {
        SyncEventBus::with_capacity(self.event_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_batch_size, 100);
        assert_eq!(config.sync_interval_secs, 900);
        assert!(config.rate_limits.is_empty());
    }

    #[test]
    fn test_deserialize_with_overrides() {
        let config: EngineConfig = serde_json::from_str(
            r#"{
                "default_batch_size": 50,
                "rate_limits": {
                    "zoho": {
                        "requests_per_minute": 10,
                        "requests_per_hour": 100,
                        "requests_per_day": 1000,
                        "burst_limit": 5,
                        "retry_after_ms": 2000
                    }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.default_batch_size, 50);
        assert_eq!(config.event_capacity, 256);
        assert_eq!(
            config.rate_limits[&CrmPlatform::Zoho].requests_per_minute,
            10
        );
    }

    #[test]
    fn test_limiter_registry_applies_overrides() {
        let mut config = EngineConfig::default();
        config.rate_limits.insert(
            CrmPlatform::Zoho,
            RateLimitConfig {
                requests_per_minute: 1,
                requests_per_hour: 10,
                requests_per_day: 100,
                burst_limit: 1,
                retry_after_ms: 1_000,
            },
        );
        let registry = config.limiter_registry();
        assert!(registry.check(CrmPlatform::Zoho).is_ok());
        assert!(registry.check(CrmPlatform::Zoho).is_err());
        // Other platforms keep their defaults.
        assert!(registry.check(CrmPlatform::HubSpot).is_ok());
    }
}
