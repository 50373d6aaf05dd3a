//! Prometheus metrics for the bus and the container.
//!
//! All metrics follow the naming convention: `conduit_<component>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, IntGauge, Opts,
    Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // BUS METRICS
    // =========================================================================

    /// Messages seen by the dispatch loop, by slug and category
    pub static ref BUS_MESSAGES_RECEIVED: CounterVec = CounterVec::new(
        Opts::new("conduit_bus_messages_received_total", "Messages dispatched by the bus"),
        &["slug", "category"]
    ).expect("metric creation failed");

    /// Handler failures (errors and panics) by handler name
    pub static ref BUS_HANDLER_FAILURES: CounterVec = CounterVec::new(
        Opts::new("conduit_bus_handler_failures_total", "Handler invocations that failed"),
        &["handler"]
    ).expect("metric creation failed");

    /// Handler execution time by handler name
    pub static ref BUS_HANDLER_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "conduit_bus_handler_duration_seconds",
            "Time spent inside message handlers"
        ).buckets(exponential_buckets(0.0001, 2.0, 15).expect("bucket layout")),
        &["handler"]
    ).expect("metric creation failed");

    /// Subscriptions registered on the bus
    pub static ref BUS_SUBSCRIPTIONS: IntGauge = IntGauge::new(
        "conduit_bus_subscriptions",
        "Number of handler subscriptions"
    ).expect("metric creation failed");

    // =========================================================================
    // CONTAINER METRICS
    // =========================================================================

    /// Bindings registered in the container
    pub static ref CONTAINER_BINDINGS: Gauge = Gauge::new(
        "conduit_container_bindings",
        "Number of capability bindings"
    ).expect("metric creation failed");
}

/// Handle proving the metrics were registered.
#[derive(Debug, Clone, Copy)]
pub struct MetricsHandle {
    _private: (),
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; metrics already registered are skipped.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Bus
        Box::new(BUS_MESSAGES_RECEIVED.clone()),
        Box::new(BUS_HANDLER_FAILURES.clone()),
        Box::new(BUS_HANDLER_DURATION.clone()),
        Box::new(BUS_SUBSCRIPTIONS.clone()),
        // Container
        Box::new(CONTAINER_BINDINGS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle { _private: () })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard observing a labelled histogram on drop.
pub struct HistogramTimer {
    histogram: prometheus::Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    pub fn new(histogram: &HistogramVec, label: &str) -> Self {
        Self {
            histogram: histogram.with_label_values(&[label]),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}
