//! Operational metrics for the export pipeline.
//!
//! All metrics follow Prometheus naming conventions:
//! - `latency_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! - `exporter`: one value per registered push exporter
//! - `status`: 2 values (success, error)

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Push duration buckets, spanning fast local sinks to slow collectors.
const PUSH_DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
];

/// Install the Prometheus recorder for self-metrics and return its handle.
///
/// Must be called before any self-metric is recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("latency_exporter_push_duration_seconds".to_string()),
            PUSH_DURATION_BUCKETS,
        )
        .map_err(|e| format!("Failed to set push duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

/// Record the outcome of one push.
///
/// Metric: `latency_exporter_pushes_total`, `latency_exporter_push_duration_seconds`
/// Labels: `exporter`, `status`
pub fn record_push(exporter: &str, success: bool, duration: Duration) {
    let status = if success { "success" } else { "error" };

    histogram!("latency_exporter_push_duration_seconds",
        "exporter" => exporter.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("latency_exporter_pushes_total",
        "exporter" => exporter.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record one completed export tick.
///
/// Metric: `latency_export_ticks_total`
pub fn record_tick() {
    counter!("latency_export_ticks_total").increment(1);
}

/// Record an in-flight tick abandoned at shutdown after the grace timeout.
///
/// Metric: `latency_export_ticks_abandoned_total`
pub fn record_tick_abandoned() {
    counter!("latency_export_ticks_abandoned_total").increment(1);
}
