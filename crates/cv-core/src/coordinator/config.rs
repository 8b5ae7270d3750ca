//! Coordinator configuration

use serde::{Serialize, Deserialize};

/// Runtime settings for a [`Coordinator`](super::Coordinator)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Share results of identical SQL between clients and requests
    pub cache_enabled: bool,

    /// Maximum number of cached query results
    pub cache_capacity: usize,

    /// Log every SQL statement at debug level
    pub log_queries: bool,

    /// How long the scheduler waits after a wakeup before draining pending
    /// clients. Changes landing inside the window share one execution.
    pub coalesce_window_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_capacity: 256,
            log_queries: false,
            coalesce_window_ms: 5,
        }
    }
}

impl CoordinatorConfig {
    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = CoordinatorConfig::from_json(r#"{ "cache_capacity": 8 }"#).unwrap();
        assert_eq!(config.cache_capacity, 8);
        assert!(config.cache_enabled);
        assert!(!config.log_queries);
        assert_eq!(config.coalesce_window_ms, 5);
    }
}
