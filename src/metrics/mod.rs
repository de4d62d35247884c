//! Metrics module
//!
//! Prometheus metrics for authentication outcomes and identity provider calls.

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};

lazy_static! {
    pub static ref AUTH_OUTCOMES: CounterVec = register_counter_vec!(
        "passage_auth_outcomes_total",
        "Authentication attempts by outcome",
        &["outcome"]  // "success", "fail" or "error"
    ).unwrap();

    pub static ref PROVIDER_REQUESTS: CounterVec = register_counter_vec!(
        "passage_provider_requests_total",
        "Identity provider requests",
        &["operation", "status"]
    ).unwrap();

    pub static ref PROVIDER_DURATION: HistogramVec = register_histogram_vec!(
        "passage_provider_request_duration_seconds",
        "Identity provider request duration in seconds",
        &["operation"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();
}

/// Record the outcome of one authentication attempt
pub fn record_auth_outcome(outcome: &str) {
    AUTH_OUTCOMES.with_label_values(&[outcome]).inc();
}

/// Record an identity provider request
pub fn record_provider_request(operation: &str, success: bool, duration_secs: f64) {
    let status = if success { "success" } else { "failure" };
    PROVIDER_REQUESTS
        .with_label_values(&[operation, status])
        .inc();
    PROVIDER_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_text() -> String {
    use prometheus::{Encoder, TextEncoder};

    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
