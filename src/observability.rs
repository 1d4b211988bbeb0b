use std::net::SocketAddr;

use tracing::warn;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: mutations attempted. Labels: op, status.
pub const MUTATIONS_TOTAL: &str = "slotbook_mutations_total";

/// Histogram: mutation latency in seconds, lock wait included. Labels: op.
pub const MUTATION_DURATION_SECONDS: &str = "slotbook_mutation_duration_seconds";

/// Counter: validation rejections. Labels: op, reason.
pub const REJECTIONS_TOTAL: &str = "slotbook_rejections_total";

/// Counter: failed store calls. Labels: op.
pub const STORE_ERRORS_TOTAL: &str = "slotbook_store_errors_total";

// ── Cache ───────────────────────────────────────────────────────

/// Counter: cached view served. Labels: view.
pub const CACHE_HITS_TOTAL: &str = "slotbook_cache_hits_total";

/// Counter: view fetched from the store. Labels: view.
pub const CACHE_MISSES_TOTAL: &str = "slotbook_cache_misses_total";

/// Gauge: entries currently cached.
pub const CACHE_ENTRIES: &str = "slotbook_cache_entries";

/// Counter: background refresh failures (entry evicted).
pub const REFRESH_FAILURES_TOTAL: &str = "slotbook_refresh_failures_total";

/// Install the Prometheus exporter on `port`. No-op if `port` is None.
/// A failed install is logged; metrics then go to the no-op recorder.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => warn!("failed to install Prometheus exporter on {addr}: {e}"),
    }
}

/// Install a `fmt` subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Short status label for a mutation outcome.
pub fn status_label<T>(result: &Result<T, crate::engine::EngineError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) if e.is_rejection() => "rejected",
        Err(_) => "error",
    }
}
