//! HTTP routes for the latency service.
//!
//! Defines the Axum router and the state it is built from.

use crate::exporters::PrometheusExporter;
use crate::handlers;
use crate::middleware::{delay_middleware, latency_middleware, SharedDelayPolicy};
use crate::recorder::LatencyRecorder;
use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Request timeout applied to every route.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Scrape route served by the pull exporter.
#[derive(Clone)]
pub struct ScrapeRoute {
    /// Route path (e.g., "/metrics").
    pub path: String,

    pub exporter: PrometheusExporter,
}

/// Everything the router needs.
#[derive(Clone)]
pub struct AppState {
    /// Shared latency recorder written by the latency middleware.
    pub recorder: Arc<LatencyRecorder>,

    /// Fault-injection policy for business routes.
    pub delay_policy: SharedDelayPolicy,

    /// Scrape route, present when the pull exporter is enabled.
    pub scrape: Option<ScrapeRoute>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/users/:id` - demo business route, subject to injected delay
/// - scrape route (e.g. `/metrics`) when the pull exporter is enabled
/// - TraceLayer for request logging
/// - 30 second request timeout
/// - latency middleware (outermost), so every response is measured,
///   including 404/405 and timeouts
pub fn build_routes(state: AppState) -> Router {
    let business_routes = Router::new()
        .route("/users/:id", get(handlers::get_user))
        .route_layer(middleware::from_fn_with_state(
            state.delay_policy.clone(),
            delay_middleware,
        ));

    let router = match state.scrape {
        Some(scrape) => business_routes.merge(
            Router::new()
                .route(&scrape.path, get(handlers::metrics_handler))
                .with_state(scrape.exporter),
        ),
        None => business_routes,
    };

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer (innermost)
    // 2. TraceLayer
    // 3. latency_middleware (outermost)
    router
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .layer(middleware::from_fn_with_state(
            state.recorder,
            latency_middleware,
        ))
}
