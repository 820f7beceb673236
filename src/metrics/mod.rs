//! Prometheus metrics of the relay, served by the admin server at `/metrics`.


use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Encoder;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tracing::error;

lazy_static! {
    pub static ref POLL_CYCLES: IntCounterVec = IntCounterVec::new(
        Opts::new("poll_cycles", "Poll cycles by source and outcome (delivered, empty, failed)"),
        &["source_id", "outcome"]
    )
    .expect("metric can not be created");

    pub static ref POLL_CYCLE_DURATION_MS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("poll_cycle_duration_ms", "Histogram of poll cycle duration in ms")
            .buckets(exponential_buckets(10.0, 2.0, 12).expect("valid buckets")),
        &["source_id"]
    )
    .expect("metric can not be created");

    pub static ref DELIVERED_ITEMS: IntCounterVec = IntCounterVec::new(
        Opts::new("delivered_items", "Items handed to the sink dispatcher"),
        &["source_id"]
    )
    .expect("metric can not be created");

    pub static ref SINK_SENDS: IntCounterVec = IntCounterVec::new(
        Opts::new("sink_sends", "Sink send attempts by result (ok, error)"),
        &["source_id", "result"]
    )
    .expect("metric can not be created");

    pub static ref WATCHER_INIT_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("watcher_init_failures", "Watcher initializations that failed"),
        &["source_id"]
    )
    .expect("metric can not be created");

    pub static ref REGISTERED_WATCHERS: IntGauge =
        IntGauge::new("registered_watchers", "Watchers currently in the registry")
            .expect("metric can not be created");

    pub static ref RECONCILE_PASSES: IntCounterVec = IntCounterVec::new(
        Opts::new("reconcile_passes", "Reconcile passes by trigger (startup, change, resync) and result"),
        &["trigger", "result"]
    )
    .expect("metric can not be created");

    pub static ref RECONCILE_ACTIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("reconcile_actions", "Watchers created, removed, replaced or failed by reconciliation"),
        &["action"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

/// Registers every relay collector into `registry`
pub fn register_custom_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(POLL_CYCLES.clone()))?;
    registry.register(Box::new(POLL_CYCLE_DURATION_MS.clone()))?;
    registry.register(Box::new(DELIVERED_ITEMS.clone()))?;
    registry.register(Box::new(SINK_SENDS.clone()))?;
    registry.register(Box::new(WATCHER_INIT_FAILURES.clone()))?;
    registry.register(Box::new(REGISTERED_WATCHERS.clone()))?;
    registry.register(Box::new(RECONCILE_PASSES.clone()))?;
    registry.register(Box::new(RECONCILE_ACTIONS.clone()))?;
    Ok(())
}

/// Registers into the process registry once; later calls are no-ops
pub fn init_metrics() {
    REGISTER.call_once(|| {
        if let Err(e) = register_custom_metrics(&REGISTRY) {
            error!("could not register custom metrics: {}", e);
        }
    });
}

/// Text exposition of the relay registry followed by the default registry
pub fn gather_metrics() -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    }
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!("could not encode prometheus metrics: {}", e);
    }

    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
