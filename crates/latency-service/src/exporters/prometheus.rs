//! Prometheus scrape exporter.
//!
//! Renders the current recorder state in the text exposition format
//! (version 0.0.4). Scrape output is always cumulative; the scrape route
//! reads the recorder directly and never goes through the scheduler.

use super::{Exporter, METRIC_DESCRIPTION, METRIC_NAME};
use crate::errors::ScrapeError;
use crate::recorder::{AggregateState, LabelSet, LatencyRecorder};
use metrics_exporter_prometheus::PrometheusHandle;
use std::fmt::Write;
use std::sync::Arc;

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Pull exporter serving the recorder on the scrape route.
#[derive(Clone)]
pub struct PrometheusExporter {
    recorder: Arc<LatencyRecorder>,

    /// Service self-metrics appended after the histogram, when installed.
    self_metrics: Option<PrometheusHandle>,
}

impl PrometheusExporter {
    #[must_use]
    pub fn new(recorder: Arc<LatencyRecorder>) -> Self {
        Self {
            recorder,
            self_metrics: None,
        }
    }

    /// Append the service's own operational metrics to every render.
    #[must_use]
    pub fn with_self_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.self_metrics = Some(handle);
        self
    }

    /// Render the current state in the text exposition format.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Encoding`] if writing to the output fails.
    pub fn render(&self) -> Result<String, ScrapeError> {
        let mut out = String::new();
        let bounds = self.recorder.buckets().bounds();

        writeln!(out, "# HELP {} {}", METRIC_NAME, METRIC_DESCRIPTION)?;
        writeln!(out, "# TYPE {} histogram", METRIC_NAME)?;

        for (labels, state) in self.recorder.snapshot() {
            write_series(&mut out, bounds, &labels, &state)?;
        }

        if let Some(handle) = &self.self_metrics {
            let rendered = handle.render();
            if !rendered.is_empty() {
                out.push('\n');
                out.push_str(&rendered);
            }
        }

        Ok(out)
    }
}

impl Exporter for PrometheusExporter {
    fn describe(&self) -> &str {
        "prometheus"
    }
}

fn write_series(
    out: &mut String,
    bounds: &[f64],
    labels: &LabelSet,
    state: &AggregateState,
) -> std::fmt::Result {
    let label_text = format_labels(labels);

    for (bound, count) in bounds.iter().zip(state.bucket_counts()) {
        writeln!(
            out,
            "{}_bucket{{{},le=\"{}\"}} {}",
            METRIC_NAME, label_text, bound, count
        )?;
    }
    writeln!(
        out,
        "{}_bucket{{{},le=\"+Inf\"}} {}",
        METRIC_NAME,
        label_text,
        state.count()
    )?;
    writeln!(out, "{}_sum{{{}}} {}", METRIC_NAME, label_text, state.sum())?;
    writeln!(out, "{}_count{{{}}} {}", METRIC_NAME, label_text, state.count())
}

fn format_labels(labels: &LabelSet) -> String {
    labels
        .pairs()
        .iter()
        .map(|(key, value)| format!("{}=\"{}\"", key, escape_label_value(value)))
        .collect::<Vec<_>>()
        .join(",")
}

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}
