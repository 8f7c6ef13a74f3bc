//! Prometheus metrics recording and endpoint.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus metrics recorder and return the handle for rendering.
pub fn install_prometheus_recorder() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    builder
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Record a new WebSocket connection.
pub fn record_ws_connect() {
    metrics::gauge!("ws_connections_active").increment(1.0);
}

/// Record a WebSocket disconnection.
pub fn record_ws_disconnect() {
    metrics::gauge!("ws_connections_active").decrement(1.0);
}

/// Record a completed user turn with how it closed.
pub fn record_turn(reason: &str, duration_ms: u64) {
    let labels = [("reason", reason.to_string())];
    metrics::counter!("turns_total", &labels).increment(1);
    metrics::histogram!("turn_duration_seconds", &labels).record(duration_ms as f64 / 1000.0);
}

/// Record how long a reply took from first delta to completion.
pub fn record_reply_duration(seconds: f64) {
    metrics::histogram!("reply_duration_seconds").record(seconds);
}

/// Record synthesized audio leaving the server.
pub fn record_audio_out(bytes: usize) {
    metrics::counter!("audio_out_bytes_total").increment(bytes as u64);
}

/// Record a barge-in interruption.
pub fn record_interruption() {
    metrics::counter!("interruptions_total").increment(1);
}

/// Record an error of a given kind.
pub fn record_error(kind: &str) {
    let labels = [("kind", kind.to_string())];
    metrics::counter!("errors_total", &labels).increment(1);
}
