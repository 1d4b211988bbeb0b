use std::time::Duration;

use crate::limits::MAX_BLOCK_RESOURCES;

/// Runtime settings for an [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a cached view is served before it counts as stale.
    pub cache_ttl: Duration,
    /// Period of the background refresher.
    pub refresh_interval: Duration,
    /// Prometheus listener port; `None` disables the exporter.
    pub metrics_port: Option<u16>,
    /// Upper bound on resources in one bulk block request.
    pub max_block_resources: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            refresh_interval: Duration::from_secs(300),
            metrics_port: None,
            max_block_resources: MAX_BLOCK_RESOURCES,
        }
    }
}

impl EngineConfig {
    /// Read `SLOTBOOK_*` variables, falling back to defaults for anything
    /// unset or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());

        let cache_ttl = parse("SLOTBOOK_CACHE_TTL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.cache_ttl);
        let refresh_interval = parse("SLOTBOOK_REFRESH_INTERVAL_SECS")
            .filter(|&s| s > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.refresh_interval);
        let metrics_port = lookup("SLOTBOOK_METRICS_PORT").and_then(|s| s.trim().parse().ok());
        let max_block_resources = parse("SLOTBOOK_MAX_BLOCK_RESOURCES")
            .and_then(|n| usize::try_from(n).ok())
            .filter(|&n| n > 0)
            .map_or(defaults.max_block_resources, |n| n.min(MAX_BLOCK_RESOURCES));

        Self {
            cache_ttl,
            refresh_interval,
            metrics_port,
            max_block_resources,
        }
    }
}
