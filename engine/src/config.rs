//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the favorites engine.
///
/// Durations are in milliseconds when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Delay before a burst of mutations is written to the cache
    pub cache_debounce_ms: u64,
    /// Delay before a post-reconciliation reload from the remote store
    pub reload_debounce_ms: u64,
    /// How long a deleted favorite can be restored
    pub undo_retention_ms: u64,
    /// Upper bound for a single remote call
    pub remote_timeout_ms: u64,
    /// Number of bundled images to pick from for new favorites
    pub image_count: u32,
    /// Display name used when neither the caller nor the name service has one
    pub fallback_display_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_debounce_ms: 300,
            reload_debounce_ms: 1_000,
            undo_retention_ms: 5 * 60 * 1_000,
            remote_timeout_ms: 10_000,
            image_count: 8,
            fallback_display_name: "Unnamed River".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn cache_debounce(&self) -> Duration {
        Duration::from_millis(self.cache_debounce_ms)
    }

    pub fn reload_debounce(&self) -> Duration {
        Duration::from_millis(self.reload_debounce_ms)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    pub fn with_cache_debounce(mut self, delay: Duration) -> Self {
        self.cache_debounce_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_reload_debounce(mut self, delay: Duration) -> Self {
        self.reload_debounce_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_undo_retention(mut self, retention: Duration) -> Self {
        self.undo_retention_ms = retention.as_millis() as u64;
        self
    }

    pub fn with_image_count(mut self, count: u32) -> Self {
        self.image_count = count;
        self
    }

    pub fn with_fallback_display_name(mut self, name: impl Into<String>) -> Self {
        self.fallback_display_name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_debounce(), Duration::from_millis(300));
        assert_eq!(config.undo_retention_ms, 300_000);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"cacheDebounceMs": 50, "imageCount": 3}"#).unwrap();
        assert_eq!(config.cache_debounce_ms, 50);
        assert_eq!(config.image_count, 3);
        assert_eq!(config.remote_timeout_ms, 10_000);
        assert_eq!(config.fallback_display_name, "Unnamed River");
    }
}
