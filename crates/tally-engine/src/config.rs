//! Engine and service configuration.

use std::time::Duration;

use tally_core::defaults;

/// Configuration for the facet-count engines and their service.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Settling window for filter changes.
    pub debounce: Duration,
    /// Maximum entries requested per labelled facet list.
    pub facet_limit: u32,
    /// Lifetime of cached counts and snapshots.
    pub cache_ttl: Duration,
    /// Capacity of the service command channel.
    pub command_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(defaults::FILTER_DEBOUNCE_MS),
            facet_limit: defaults::FACET_LIMIT,
            cache_ttl: Duration::from_secs(defaults::CACHE_TTL_SECS),
            command_capacity: defaults::COMMAND_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Set the debounce window, clamped to the accepted 300..=500 ms range.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        let min = Duration::from_millis(defaults::FILTER_DEBOUNCE_MIN_MS);
        let max = Duration::from_millis(defaults::FILTER_DEBOUNCE_MAX_MS);
        self.debounce = debounce.clamp(min, max);
        self
    }

    pub fn with_facet_limit(mut self, limit: u32) -> Self {
        self.facet_limit = limit.max(1);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity.max(1);
        self
    }
}
