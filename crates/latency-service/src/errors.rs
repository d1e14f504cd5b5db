//! Latency service error types.
//!
//! Export failures are transient and never reach request handlers. The only
//! error that maps to an HTTP response is [`ScrapeError`], returned by the
//! scrape route when rendering fails. Internal details are logged
//! server-side, the scraper only sees a generic message.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Failure of a single exporter push or flush.
///
/// Always recoverable: the scheduler logs it, counts it and moves on.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Network-level failure talking to a remote collector.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Remote collector answered with a non-success status.
    #[error("Collector rejected export with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Push did not complete within the exporter timeout.
    #[error("Export timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Batch could not be encoded for the backend.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Local sink write failed.
    #[error("I/O error: {0}")]
    Io(String),
}

impl ExportError {
    /// Short bounded label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ExportError::Transport(_) => "transport",
            ExportError::Rejected { .. } => "rejected",
            ExportError::Timeout(_) => "timeout",
            ExportError::Encoding(_) => "encoding",
            ExportError::Io(_) => "io",
        }
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        ExportError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(err: serde_json::Error) -> Self {
        ExportError::Encoding(err.to_string())
    }
}

/// Export scheduler lifecycle misuse.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Export scheduler is already running")]
    AlreadyRunning,
}

/// Failure while rendering the scrape response.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Failed to encode metrics: {0}")]
    Encoding(#[from] std::fmt::Error),
}

impl IntoResponse for ScrapeError {
    fn into_response(self) -> Response {
        tracing::error!(target: "latency.scrape", error = %self, "Metrics rendering failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "An internal error occurred while rendering metrics",
        )
            .into_response()
    }
}

/// Fatal service startup or serve failure.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Exporter construction failed: {0}")]
    ExporterInit(String),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use std::time::Duration;

    async fn read_body(body: Body) -> String {
        let bytes = body.collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_display_rejected() {
        let error = ExportError::Rejected {
            status: 503,
            body: "overloaded".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "Collector rejected export with status 503: overloaded"
        );
    }

    #[test]
    fn test_export_error_kinds_are_bounded() {
        assert_eq!(ExportError::Transport("x".into()).kind(), "transport");
        assert_eq!(
            ExportError::Rejected {
                status: 400,
                body: String::new()
            }
            .kind(),
            "rejected"
        );
        assert_eq!(ExportError::Timeout(Duration::from_secs(1)).kind(), "timeout");
        assert_eq!(ExportError::Encoding("x".into()).kind(), "encoding");
        assert_eq!(ExportError::Io("x".into()).kind(), "io");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let error: ExportError = io.into();
        assert!(matches!(error, ExportError::Io(msg) if msg.contains("pipe closed")));
    }

    #[tokio::test]
    async fn test_scrape_error_is_generic_500() {
        let response = ScrapeError::Encoding(std::fmt::Error).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = read_body(response.into_body()).await;
        assert!(body.contains("internal error"));
        assert!(!body.contains("fmt"));
    }

    #[test]
    fn test_scheduler_error_display() {
        assert_eq!(
            SchedulerError::AlreadyRunning.to_string(),
            "Export scheduler is already running"
        );
    }
}
