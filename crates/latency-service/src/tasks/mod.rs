//! Background tasks for the latency service.
//!
//! # Tasks
//!
//! - `export_scheduler` - periodically pushes the latency histogram to push exporters

pub mod export_scheduler;

pub use export_scheduler::{ExportScheduler, SchedulerConfig};
