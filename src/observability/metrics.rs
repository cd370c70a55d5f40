//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define relay metrics (sessions, bytes, errors)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `relay_sessions_total` (counter): accepted sessions by role
//! - `relay_active_sessions` (gauge): current session count by role
//! - `relay_bytes_total` (counter): forwarded bytes by role, direction
//! - `relay_session_errors_total` (counter): fatal session errors by role, kind
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Labels are static strings; no per-destination cardinality

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

pub fn session_opened(role: &'static str) {
    metrics::counter!("relay_sessions_total", "role" => role).increment(1);
    metrics::gauge!("relay_active_sessions", "role" => role).increment(1.0);
}

pub fn session_closed(role: &'static str) {
    metrics::gauge!("relay_active_sessions", "role" => role).decrement(1.0);
}

pub fn bytes_forwarded(role: &'static str, direction: &'static str, n: u64) {
    metrics::counter!("relay_bytes_total", "role" => role, "direction" => direction).increment(n);
}

pub fn session_failed(role: &'static str, kind: &'static str) {
    metrics::counter!("relay_session_errors_total", "role" => role, "kind" => kind).increment(1);
}
