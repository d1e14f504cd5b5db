//! Middleware for the latency service.
//!
//! # Components
//!
//! - `latency` - records request latency into the shared recorder (outermost)
//! - `delay` - fault-injection delay, applied inside the latency layer

pub mod delay;
pub mod latency;

pub use delay::{
    delay_middleware, policy_from_config, DelayPolicy, FixedDelay, NoDelay, SampledDelay,
    SharedDelayPolicy,
};
pub use latency::{latency_middleware, method_label};
