//! Observability for the latency service itself.
//!
//! Operational metrics about exporters and the scheduler, plus log setup.
//! The request latency histogram is not here: it lives in the recorder and
//! leaves the process through the exporters.

pub mod logging;
pub mod metrics;
