//! HTTP request handlers for the latency service.

pub mod metrics;
pub mod users;

pub use metrics::metrics_handler;
pub use users::get_user;
