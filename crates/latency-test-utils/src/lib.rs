//! # Latency Test Utilities
//!
//! Shared test utilities for the latency service.
//!
//! This crate provides:
//! - Server test harness (`TestLatencyServer` for E2E tests)
//! - Push exporter doubles (`CapturingExporter`, `FailingExporter`, `SlowExporter`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use latency_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let capture = CapturingExporter::cumulative();
//!     let server = TestLatencyServer::spawn(&[], vec![capture.clone()]).await?;
//!
//!     reqwest::get(format!("{}/users/1", server.url())).await?;
//!     server.shutdown().await?;
//!
//!     assert_eq!(capture.batches().len(), 1);
//!     Ok(())
//! }
//! ```

pub mod exporters;
pub mod server_harness;

// Re-export commonly used items
pub use exporters::*;
pub use server_harness::*;
