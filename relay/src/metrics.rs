//! Request lifecycle metrics.
//!
//! Recorded through the `metrics` facade, so they flow to whichever recorder
//! the host installed (see `agent_relay_runtime::metrics::MetricsRecorder`).

use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Describe the relay metrics on the installed recorder.
///
/// Call once after installing a recorder so exported metrics carry help text.
pub fn describe_metrics() {
    describe_counter!(
        "relay_requests_dispatched_total",
        "Total number of prompts dispatched, by mode (channel, simulated, unavailable)"
    );
    describe_counter!(
        "relay_requests_completed_total",
        "Total number of requests that reached a terminal status, by status"
    );
    describe_gauge!(
        "relay_requests_active",
        "Number of requests currently tracked by a hook's registry, by handler"
    );
    describe_counter!(
        "relay_router_discarded_total",
        "Total number of results discarded by the router, by reason"
    );
    describe_counter!(
        "relay_callback_panics_total",
        "Total number of consumer callback panics caught"
    );
}

/// Request lifecycle metrics recorder.
pub struct RelayMetrics;

impl RelayMetrics {
    /// Record a dispatch (`mode` is `channel`, `simulated` or `unavailable`).
    pub fn record_dispatch(mode: &'static str) {
        counter!("relay_requests_dispatched_total", "mode" => mode).increment(1);
    }

    /// Record a request reaching a terminal status.
    pub fn record_completion(status: &'static str) {
        counter!("relay_requests_completed_total", "status" => status).increment(1);
    }

    /// Record the registry size of the hook registered as `handler`.
    #[allow(clippy::cast_precision_loss)] // Registry sizes are far below 2^52
    pub fn record_active(handler: &str, count: usize) {
        gauge!("relay_requests_active", "handler" => handler.to_string()).set(count as f64);
    }

    /// Record a result dropped by the router.
    pub fn record_discard(reason: &'static str) {
        counter!("relay_router_discarded_total", "reason" => reason).increment(1);
    }

    /// Record a caught consumer callback panic.
    pub fn record_callback_panic() {
        counter!("relay_callback_panics_total").increment(1);
    }
}
