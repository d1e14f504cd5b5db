//! Request latency middleware.
//!
//! Measures the full downstream chain, including framework-level responses
//! that never reach a handler (404, 405, timeouts), and writes one
//! measurement per request into the shared [`LatencyRecorder`].
//!
//! Must be the outermost layer of the instrumented router.

use crate::recorder::{LabelSet, LatencyRecorder, Measurement, FALLBACK_LABEL};
use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tokio::time::Instant;

/// Label value for an HTTP method.
///
/// Methods outside the standard set map to the fallback label so a client
/// cannot grow label cardinality with made-up methods.
#[must_use]
pub fn method_label(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::HEAD => "HEAD",
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::DELETE => "DELETE",
        Method::CONNECT => "CONNECT",
        Method::OPTIONS => "OPTIONS",
        Method::TRACE => "TRACE",
        Method::PATCH => "PATCH",
        _ => FALLBACK_LABEL,
    }
}

/// Middleware that records the latency of every response.
///
/// Use with `axum::middleware::from_fn_with_state`.
pub async fn latency_middleware(
    State(recorder): State<Arc<LatencyRecorder>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = method_label(request.method());

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let labels = LabelSet::new(method, response.status().as_str());
    recorder.record(Measurement::from_duration(elapsed, labels));

    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use std::time::Duration;
    use tower::ServiceExt;

    async fn handler_200() -> &'static str {
        "OK"
    }

    async fn handler_500() -> (StatusCode, &'static str) {
        (StatusCode::INTERNAL_SERVER_ERROR, "Error")
    }

    async fn handler_slow() -> &'static str {
        tokio::time::sleep(Duration::from_millis(300)).await;
        "slow"
    }

    fn test_app(recorder: Arc<LatencyRecorder>) -> Router {
        Router::new()
            .route("/success", get(handler_200))
            .route("/error", get(handler_500))
            .route("/slow", get(handler_slow))
            .layer(middleware::from_fn_with_state(recorder, latency_middleware))
    }

    fn request(method: &str, uri: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request builder should succeed")
    }

    fn count_for(recorder: &LatencyRecorder, method: &str, status: &str) -> u64 {
        recorder
            .snapshot()
            .into_iter()
            .find(|(l, _)| l.method() == method && l.status() == status)
            .map(|(_, s)| s.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_middleware_records_success() {
        let recorder = Arc::new(LatencyRecorder::default());
        let response = test_app(Arc::clone(&recorder))
            .oneshot(request("GET", "/success"))
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(count_for(&recorder, "GET", "200"), 1);
        assert_eq!(recorder.series_count(), 1);
    }

    #[tokio::test]
    async fn test_middleware_records_handler_error_status() {
        let recorder = Arc::new(LatencyRecorder::default());
        let response = test_app(Arc::clone(&recorder))
            .oneshot(request("GET", "/error"))
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(count_for(&recorder, "GET", "500"), 1);
    }

    #[tokio::test]
    async fn test_middleware_records_unknown_route() {
        let recorder = Arc::new(LatencyRecorder::default());
        let response = test_app(Arc::clone(&recorder))
            .oneshot(request("GET", "/nope"))
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(count_for(&recorder, "GET", "404"), 1);
    }

    #[tokio::test]
    async fn test_middleware_records_method_not_allowed() {
        let recorder = Arc::new(LatencyRecorder::default());
        let response = test_app(Arc::clone(&recorder))
            .oneshot(request("POST", "/success"))
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(count_for(&recorder, "POST", "405"), 1);
    }

    #[tokio::test]
    async fn test_nonstandard_method_uses_fallback_label() {
        let recorder = Arc::new(LatencyRecorder::default());
        test_app(Arc::clone(&recorder))
            .oneshot(request("PURGE", "/success"))
            .await
            .expect("request should succeed");

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.iter().all(|(l, _)| l.method() == FALLBACK_LABEL));
    }

    #[tokio::test(start_paused = true)]
    async fn test_middleware_measures_handler_time() {
        let recorder = Arc::new(LatencyRecorder::default());
        test_app(Arc::clone(&recorder))
            .oneshot(request("GET", "/slow"))
            .await
            .expect("request should succeed");

        let (_, state) = recorder.snapshot().into_iter().next().unwrap();
        assert_eq!(state.count(), 1);
        assert!(state.sum() >= 0.3, "sum {} should include the handler sleep", state.sum());
        // 0.3s lands in the 0.5 bucket, not 0.25
        assert_eq!(state.bucket_counts(), &[0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn test_method_label_standard_set() {
        assert_eq!(method_label(&Method::GET), "GET");
        assert_eq!(method_label(&Method::PATCH), "PATCH");
        let custom = Method::from_bytes(b"BREW").unwrap();
        assert_eq!(method_label(&custom), "");
    }
}
