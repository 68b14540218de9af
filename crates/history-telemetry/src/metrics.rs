//! Prometheus metrics for the history replica.
//!
//! All metrics follow the naming convention: `qc_history_<metric>_<unit>`
//!
//! Label values are kept to a closed set (transaction type names and error
//! kinds) so series cardinality stays bounded.

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge,
    Opts, Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // EVENT BRIDGE
    // =========================================================================

    /// Events taken off the bus by the bridge
    pub static ref EVENTS_RECEIVED: IntCounterVec = IntCounterVec::new(
        Opts::new("qc_history_events_received_total", "Bus events received by the history bridge"),
        &["kind"]  // kind: header/tx
    ).expect("metric creation failed");

    /// Work items waiting in the bridge to dispatcher queue
    pub static ref QUEUE_DEPTH: IntGauge = IntGauge::new(
        "qc_history_queue_depth",
        "Work items queued between bridge and dispatcher"
    ).expect("metric creation failed");

    // =========================================================================
    // DISPATCHER
    // =========================================================================

    /// Transaction events the dispatcher dropped without a handler
    pub static ref EVENTS_DROPPED: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "qc_history_events_dropped_total",
            "Transaction events dropped by the dispatcher"
        ),
        &["reason"]  // reason: untagged/unknown_type
    ).expect("metric creation failed");

    /// Transaction records written to the backend
    pub static ref RECORDS_PERSISTED: IntCounterVec = IntCounterVec::new(
        Opts::new("qc_history_records_persisted_total", "Transaction records written to storage"),
        &["tx_type"]
    ).expect("metric creation failed");

    /// Handler failures by transaction type and error kind
    pub static ref HANDLER_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("qc_history_handler_failures_total", "Transaction handler failures"),
        &["tx_type", "error"]
    ).expect("metric creation failed");

    /// Transfers that debited the sender but could not credit the receiver
    pub static ref LEDGER_INCONSISTENCIES: IntCounter = IntCounter::new(
        "qc_history_ledger_inconsistencies_total",
        "Transfers left half applied in the ledger replica"
    ).expect("metric creation failed");

    /// Time spent handling one transaction
    pub static ref EVENT_PROCESSING_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "qc_history_event_processing_duration_seconds",
            "Time spent replicating a single transaction"
        ).buckets(exponential_buckets(0.0001, 2.0, 16).expect("valid bucket layout"))
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; metrics that are already registered are
/// left in place.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Bridge
        Box::new(EVENTS_RECEIVED.clone()),
        Box::new(EVENTS_DROPPED.clone()),
        Box::new(QUEUE_DEPTH.clone()),
        // Dispatcher
        Box::new(RECORDS_PERSISTED.clone()),
        Box::new(HANDLER_FAILURES.clone()),
        Box::new(LEDGER_INCONSISTENCIES.clone()),
        Box::new(EVENT_PROCESSING_DURATION.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn gather_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
