//! Latency Service
//!
//! Records per-request HTTP latency into an in-process histogram and exports
//! it to any combination of a remote OTLP collector, a Prometheus scrape
//! route and a local stdout sink.
//!
//! # Architecture
//!
//! ```text
//! request ──► latency middleware ──► delay middleware ──► handler
//!                   │
//!                   ▼
//!            LatencyRecorder ◄── scrape route (PrometheusExporter)
//!                   │
//!                   ▼
//!            ExportScheduler ──► OtlpExporter / StdoutExporter
//! ```
//!
//! The request path only ever touches the recorder; exporter I/O happens on
//! the scheduler task or on the scrape request.

pub mod config;
pub mod errors;
pub mod exporters;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod recorder;
pub mod routes;
pub mod service;
pub mod tasks;

pub use config::Config;
pub use errors::{ExportError, SchedulerError, ScrapeError, ServiceError};
pub use exporters::{ExportBatch, Exporter, PushExporter, Temporality};
pub use recorder::{LabelSet, LatencyRecorder, Measurement};
pub use service::Service;
pub use tasks::ExportScheduler;
