//! Fault-injection delay middleware.
//!
//! Sleeps before handing the request to the handler, according to a
//! [`DelayPolicy`]. Placed inside the latency layer, so injected delay shows
//! up as handler latency in the histogram.

use crate::config::Config;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Decides whether a request gets an artificial delay.
pub trait DelayPolicy: Send + Sync {
    /// Delay to apply to the next request, if any.
    fn next_delay(&self) -> Option<Duration>;
}

/// Policy shared between the router and the delay middleware.
pub type SharedDelayPolicy = Arc<dyn DelayPolicy>;

/// Never delays.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl DelayPolicy for NoDelay {
    fn next_delay(&self) -> Option<Duration> {
        None
    }
}

/// Delays every request by the same amount.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

impl DelayPolicy for FixedDelay {
    fn next_delay(&self) -> Option<Duration> {
        Some(self.0)
    }
}

/// Delays a random share of requests.
#[derive(Debug, Clone, Copy)]
pub struct SampledDelay {
    percent: u8,
    delay: Duration,
}

impl SampledDelay {
    /// Delay `percent` out of 100 requests (values above 100 are capped).
    #[must_use]
    pub fn new(percent: u8, delay: Duration) -> Self {
        Self {
            percent: percent.min(100),
            delay,
        }
    }

    #[must_use]
    pub fn percent(&self) -> u8 {
        self.percent
    }
}

impl DelayPolicy for SampledDelay {
    fn next_delay(&self) -> Option<Duration> {
        let roll: u8 = rand::thread_rng().gen_range(0..100);
        (roll < self.percent).then_some(self.delay)
    }
}

/// Build the delay policy selected by configuration.
#[must_use]
pub fn policy_from_config(config: &Config) -> SharedDelayPolicy {
    match config.injected_delay_percent {
        0 => Arc::new(NoDelay),
        100 => Arc::new(FixedDelay(config.injected_delay)),
        percent => Arc::new(SampledDelay::new(percent, config.injected_delay)),
    }
}

/// Middleware that applies the configured delay before the handler runs.
///
/// Use with `axum::middleware::from_fn_with_state`.
pub async fn delay_middleware(
    State(policy): State<SharedDelayPolicy>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(delay) = policy.next_delay() {
        tracing::trace!(target: "latency.middleware.delay", delay_ms = delay.as_millis() as u64, "Injecting delay");
        tokio::time::sleep(delay).await;
    }
    next.run(request).await
}
