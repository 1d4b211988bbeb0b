use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::notify::NotifyHub;
use crate::observability::{self, REFRESH_FAILURES_TOTAL};
use crate::store::DocumentStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub refreshed: usize,
    pub failed: usize,
    /// Stale entries dropped because nothing read them during the last TTL.
    pub dropped: usize,
}

/// Build an engine over `store`, install the metrics exporter if a port is
/// configured and spawn the refresher. Must run inside a tokio runtime.
pub fn start(store: Arc<dyn DocumentStore>, config: EngineConfig) -> (Arc<Engine>, JoinHandle<()>) {
    observability::init(config.metrics_port);
    info!(
        cache_ttl_secs = config.cache_ttl.as_secs(),
        refresh_secs = config.refresh_interval.as_secs(),
        max_block_resources = config.max_block_resources,
        "starting engine"
    );
    let engine = Arc::new(Engine::new(store, Arc::new(NotifyHub::new()), config));
    let refresher = tokio::spawn(run_refresher(engine.clone()));
    (engine, refresher)
}

/// Background task that re-fetches cached views once their TTL has passed.
pub async fn run_refresher(engine: Arc<Engine>) {
    // `interval` panics on a zero period.
    let period = engine.config().refresh_interval.max(Duration::from_secs(1));
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let stats = refresh_stale(&engine).await;
        if stats != RefreshStats::default() {
            debug!(refreshed = stats.refreshed, failed = stats.failed, dropped = stats.dropped, "cache refresh pass");
        }
    }
}

/// One refresh pass. Stale entries read during the last TTL are re-fetched
/// and the rest are dropped. A failed fetch evicts the entry so the next read
/// goes to the store; the error is logged and otherwise ignored.
pub async fn refresh_stale(engine: &Engine) -> RefreshStats {
    let sweep = engine.cache.sweep();
    let mut stats = RefreshStats {
        dropped: sweep.dropped,
        ..RefreshStats::default()
    };
    for key in sweep.refresh {
        let generation = engine.cache.generation();
        match engine.fetch_view(key).await {
            Ok(view) => {
                engine.cache.put(key, view, generation);
                stats.refreshed += 1;
            }
            Err(e) => {
                metrics::counter!(REFRESH_FAILURES_TOTAL, "view" => key.label()).increment(1);
                warn!(view = key.label(), service_id = %key.service_id(), "refresh failed: {e}");
                engine.cache.evict(&key);
                stats.failed += 1;
            }
        }
    }
    stats
}
