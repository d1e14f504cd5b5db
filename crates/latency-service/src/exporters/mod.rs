//! Exporter backends for the latency histogram.
//!
//! Every backend implements [`Exporter`]. Push backends additionally
//! implement [`PushExporter`] and are driven by the export scheduler; the
//! pull backend ([`PrometheusExporter`]) is driven by the scrape route.
//!
//! # Backends
//!
//! - `otlp` - pushes OTLP/HTTP protobuf to a remote collector
//! - `prometheus` - renders the text exposition format on scrape
//! - `stdout` - writes one JSON document per tick to a local writer

pub mod otlp;
pub mod prometheus;
pub mod stdout;

pub use otlp::OtlpExporter;
pub use prometheus::PrometheusExporter;
pub use stdout::StdoutExporter;

use crate::errors::ExportError;
use crate::recorder::{AggregateState, LabelSet};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Metric name reported by every backend.
pub const METRIC_NAME: &str = "http_durations_histogram_seconds";

/// Metric description reported by every backend.
pub const METRIC_DESCRIPTION: &str = "Http latency distributions.";

/// Instrumentation scope reported by push backends.
pub const SCOPE_NAME: &str = "latency-service";

/// How aggregate values relate to earlier exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Temporality {
    /// Totals since the recorder was created.
    Cumulative,
    /// Change since the previous export to the same exporter.
    Delta,
}

impl Temporality {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Temporality::Cumulative => "cumulative",
            Temporality::Delta => "delta",
        }
    }
}

impl fmt::Display for Temporality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Temporality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cumulative" => Ok(Temporality::Cumulative),
            "delta" => Ok(Temporality::Delta),
            other => Err(format!(
                "must be 'cumulative' or 'delta', got '{}'",
                other
            )),
        }
    }
}

/// One series of an export batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub labels: LabelSet,
    pub state: AggregateState,
}

/// Aggregated data handed to a push exporter on one tick.
///
/// For [`Temporality::Delta`] batches the window is `start_time..end_time`
/// of the previous and the current tick; for cumulative batches
/// `start_time` is when the recorder started.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportBatch {
    pub temporality: Temporality,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub bounds: Vec<f64>,
    pub series: Vec<SeriesPoint>,
}

impl ExportBatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Total measurement count across every series of the batch.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.series.iter().map(|p| p.state.count()).sum()
    }
}

/// Common capability of every exporter backend.
pub trait Exporter: Send + Sync {
    /// Short backend identity used in logs and metric labels.
    fn describe(&self) -> &str;
}

/// An exporter the scheduler pushes batches to.
#[async_trait]
pub trait PushExporter: Exporter {
    /// Temporality of the batches this exporter expects.
    fn temporality(&self) -> Temporality;

    /// Deliver one batch.
    ///
    /// # Errors
    ///
    /// Any [`ExportError`] is treated as transient by the caller.
    async fn push(&self, batch: &ExportBatch) -> Result<(), ExportError>;

    /// Drain any buffered output.
    async fn flush(&self) -> Result<(), ExportError> {
        Ok(())
    }

    /// Release backend resources. Called once, after the final flush.
    async fn shutdown(&self) -> Result<(), ExportError> {
        Ok(())
    }
}
