//! Prometheus scrape endpoint handler.
//!
//! Unauthenticated so Prometheus can scrape it. Labels are bounded
//! (method, status), and no request data beyond those is exposed.

use crate::errors::ScrapeError;
use crate::exporters::prometheus::{PrometheusExporter, CONTENT_TYPE};
use axum::{extract::State, http::header, response::IntoResponse};

/// Handler for GET /metrics (path is configurable)
///
/// # Response
///
/// Returns 200 OK with the text exposition format:
/// ```text
/// # HELP http_durations_histogram_seconds Http latency distributions.
/// # TYPE http_durations_histogram_seconds histogram
/// http_durations_histogram_seconds_bucket{method="GET",status="200",le="0.05"} 1
/// ```
///
/// Returns 500 with a generic message if rendering fails.
#[tracing::instrument(skip_all, name = "latency.metrics.scrape")]
pub async fn metrics_handler(
    State(exporter): State<PrometheusExporter>,
) -> Result<impl IntoResponse, ScrapeError> {
    let body = exporter.render()?;
    Ok(([(header::CONTENT_TYPE, CONTENT_TYPE)], body))
}
