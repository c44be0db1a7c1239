use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Encoder, Histogram, IntCounter,
    IntGauge, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    pub static ref BRIDGE_UP: IntGauge = register_int_gauge!(
        "bridge_up",
        "Whether the bridge is serving (1) or not (0)"
    ).unwrap();

    // Query metrics
    pub static ref QUERIES: IntCounter = register_int_counter!(
        "bridge_queries_total",
        "Total number of queries received across all batches"
    ).unwrap();

    pub static ref QUERY_FAILURES: IntCounter = register_int_counter!(
        "bridge_query_failures_total",
        "Total number of queries that produced an error result"
    ).unwrap();

    pub static ref BACKEND_REQUEST_DURATION: Histogram = register_histogram!(
        "bridge_backend_request_duration_seconds",
        "Backend request duration in seconds",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 30.0]
    ).unwrap();

    // Credential metrics
    pub static ref CREDENTIAL_RELOADS: IntCounter = register_int_counter!(
        "bridge_credential_reloads_total",
        "Total number of client certificate or CA reloads"
    ).unwrap();

    pub static ref PASSTHROUGH_REQUESTS: IntCounter = register_int_counter!(
        "bridge_passthrough_requests_total",
        "Total number of resource requests forwarded to the backend"
    ).unwrap();
}

// Statics register with the default registry on first touch.
fn register_all() {
    lazy_static::initialize(&BRIDGE_UP);
    lazy_static::initialize(&QUERIES);
    lazy_static::initialize(&QUERY_FAILURES);
    lazy_static::initialize(&BACKEND_REQUEST_DURATION);
    lazy_static::initialize(&CREDENTIAL_RELOADS);
    lazy_static::initialize(&PASSTHROUGH_REQUESTS);
}

pub fn init_metrics() {
    register_all();
    BRIDGE_UP.set(1);
}

/// Observes the backend call duration when dropped.
pub struct RequestTimer {
    start: Instant,
}

impl RequestTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for RequestTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        BACKEND_REQUEST_DURATION.observe(self.start.elapsed().as_secs_f64());
    }
}

pub fn record_query() {
    QUERIES.inc();
}

pub fn record_query_failure() {
    QUERY_FAILURES.inc();
}

pub fn record_credential_reload() {
    CREDENTIAL_RELOADS.inc();
}

pub fn record_passthrough() {
    PASSTHROUGH_REQUESTS.inc();
}

/// Text exposition of every registered metric.
pub fn render() -> String {
    register_all();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}
