//! OTLP/HTTP push exporter.
//!
//! Encodes each batch as a protobuf `ExportMetricsServiceRequest` built from
//! the `opentelemetry-proto` message types and POSTs it to the configured
//! collector with the configured routing headers (for example
//! `X-Scope-OrgID` for multi-tenant backends).

use super::{
    ExportBatch, Exporter, PushExporter, Temporality, METRIC_DESCRIPTION, METRIC_NAME, SCOPE_NAME,
};
use crate::config::OtlpConfig;
use crate::errors::ExportError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, InstrumentationScope, KeyValue};
use opentelemetry_proto::tonic::metrics::v1::{
    metric, AggregationTemporality, Histogram, HistogramDataPoint, Metric, ResourceMetrics,
    ScopeMetrics,
};
use opentelemetry_proto::tonic::resource::v1::Resource;
use prost::Message;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Connect timeout for the collector.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Longest collector response body kept in an error.
const MAX_ERROR_BODY_LEN: usize = 512;

/// OTLP/HTTP binary encoding.
pub const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";

fn string_attribute(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(any_value::Value::StringValue(value.to_string())),
        }),
    }
}

fn unix_nanos(time: DateTime<Utc>) -> u64 {
    // Negative before 1970, out of range after 2262.
    time.timestamp_nanos_opt()
        .and_then(|nanos| u64::try_from(nanos).ok())
        .unwrap_or(0)
}

/// Build the OTLP request for one batch.
pub(crate) fn encode_request(batch: &ExportBatch) -> ExportMetricsServiceRequest {
    let aggregation_temporality = match batch.temporality {
        Temporality::Delta => AggregationTemporality::Delta,
        Temporality::Cumulative => AggregationTemporality::Cumulative,
    };
    let start_time_unix_nano = unix_nanos(batch.start_time);
    let time_unix_nano = unix_nanos(batch.end_time);

    let data_points = batch
        .series
        .iter()
        .map(|point| HistogramDataPoint {
            attributes: point
                .labels
                .pairs()
                .iter()
                .map(|(key, value)| string_attribute(key, value))
                .collect(),
            start_time_unix_nano,
            time_unix_nano,
            count: point.state.count(),
            sum: Some(point.state.sum()),
            bucket_counts: point.state.explicit_bucket_counts(),
            explicit_bounds: batch.bounds.clone(),
            ..Default::default()
        })
        .collect();

    ExportMetricsServiceRequest {
        resource_metrics: vec![ResourceMetrics {
            resource: Some(Resource {
                attributes: vec![string_attribute("service.name", SCOPE_NAME)],
                ..Default::default()
            }),
            scope_metrics: vec![ScopeMetrics {
                scope: Some(InstrumentationScope {
                    name: SCOPE_NAME.to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    ..Default::default()
                }),
                metrics: vec![Metric {
                    name: METRIC_NAME.to_string(),
                    description: METRIC_DESCRIPTION.to_string(),
                    unit: "s".to_string(),
                    data: Some(metric::Data::Histogram(Histogram {
                        data_points,
                        aggregation_temporality: aggregation_temporality as i32,
                    })),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

/// Push exporter for a remote OTLP/HTTP collector.
#[derive(Clone)]
pub struct OtlpExporter {
    /// HTTP client with collector headers and timeouts applied.
    client: Client,

    /// Fully resolved collector URL.
    url: Url,

    temporality: Temporality,

    /// Client-side request timeout, reported on timeout errors.
    timeout: Duration,
}

impl OtlpExporter {
    /// Create an exporter for the configured collector.
    ///
    /// # Errors
    ///
    /// Returns `ExportError::Encoding` if a header cannot be encoded and
    /// `ExportError::Transport` if the HTTP client cannot be built.
    pub fn new(config: &OtlpConfig) -> Result<Self, ExportError> {
        let mut headers = HeaderMap::new();
        for (name, value) in config.exposed_headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ExportError::Encoding(format!("invalid header name: {e}")))?;
            let mut value = HeaderValue::from_str(value)
                .map_err(|e| ExportError::Encoding(format!("invalid header value: {e}")))?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(PROTOBUF_CONTENT_TYPE));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ExportError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            temporality: config.temporality,
            timeout: config.timeout,
        })
    }

    /// Collector URL batches are posted to.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Exporter for OtlpExporter {
    fn describe(&self) -> &str {
        "otlp"
    }
}

#[async_trait]
impl PushExporter for OtlpExporter {
    fn temporality(&self) -> Temporality {
        self.temporality
    }

    #[instrument(skip_all, name = "latency.exporter.otlp.push", fields(series = batch.series.len()))]
    async fn push(&self, batch: &ExportBatch) -> Result<(), ExportError> {
        if batch.is_empty() {
            debug!(target: "latency.exporter.otlp", "No series recorded yet, skipping push");
            return Ok(());
        }

        let body = encode_request(batch).encode_to_vec();

        let response = self
            .client
            .post(self.url.clone())
            .body(body)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "latency.exporter.otlp", error = %e, url = %self.url, "Collector request failed");
                if e.is_timeout() {
                    ExportError::Timeout(self.timeout)
                } else {
                    ExportError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(
                target: "latency.exporter.otlp",
                status = status.as_u16(),
                series = batch.series.len(),
                "Batch accepted by collector"
            );
            return Ok(());
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY_LEN {
            let cut = (0..=MAX_ERROR_BODY_LEN)
                .rev()
                .find(|i| body.is_char_boundary(*i))
                .unwrap_or(0);
            body.truncate(cut);
        }

        warn!(
            target: "latency.exporter.otlp",
            status = status.as_u16(),
            "Collector rejected batch"
        );
        Err(ExportError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::exporters::SeriesPoint;
    use crate::recorder::{LabelSet, LatencyRecorder, Measurement};
    use chrono::TimeZone;
    use std::collections::HashMap;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn batch_with(values: &[f64], temporality: Temporality) -> ExportBatch {
        let recorder = LatencyRecorder::default();
        for v in values {
            recorder.record(Measurement::new(*v, LabelSet::new("GET", "200")));
        }
        ExportBatch {
            temporality,
            start_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            end_time: Utc.timestamp_opt(1_700_000_015, 0).unwrap(),
            bounds: recorder.buckets().bounds().to_vec(),
            series: recorder
                .snapshot()
                .into_iter()
                .map(|(labels, state)| SeriesPoint { labels, state })
                .collect(),
        }
    }

    fn config_for(server: &MockServer, extra: &[(&str, &str)]) -> OtlpConfig {
        let mut vars: HashMap<String, String> = HashMap::new();
        vars.insert("OTLP_ENDPOINT".into(), server.address().to_string());
        for (k, v) in extra {
            vars.insert((*k).to_string(), (*v).to_string());
        }
        Config::from_vars(&vars).unwrap().otlp
    }

    fn histogram_of(request: &ExportMetricsServiceRequest) -> (&Metric, &Histogram) {
        let metric = &request.resource_metrics[0].scope_metrics[0].metrics[0];
        match metric.data.as_ref() {
            Some(metric::Data::Histogram(histogram)) => (metric, histogram),
            other => panic!("expected histogram data, got {other:?}"),
        }
    }

    fn string_value(attribute: &KeyValue) -> Option<&str> {
        match attribute.value.as_ref()?.value.as_ref()? {
            any_value::Value::StringValue(value) => Some(value),
            _ => None,
        }
    }

    #[test]
    fn test_encode_request_layout() {
        let batch = batch_with(&[0.02, 0.07, 0.3], Temporality::Cumulative);
        let request = encode_request(&batch);

        let scope_metrics = &request.resource_metrics[0].scope_metrics[0];
        assert_eq!(
            scope_metrics.scope.as_ref().map(|s| s.name.as_str()),
            Some("latency-service")
        );

        let (metric, histogram) = histogram_of(&request);
        assert_eq!(metric.name, "http_durations_histogram_seconds");
        assert_eq!(metric.description, "Http latency distributions.");
        assert_eq!(
            histogram.aggregation_temporality,
            AggregationTemporality::Cumulative as i32
        );

        let point = &histogram.data_points[0];
        assert_eq!(point.count, 3);
        assert_eq!(point.bucket_counts, vec![1, 1, 1, 0, 0, 0, 0]);
        assert_eq!(point.explicit_bounds, vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0]);
        assert_eq!(point.start_time_unix_nano, 1_700_000_000_000_000_000);
        assert_eq!(point.time_unix_nano, 1_700_000_015_000_000_000);
        assert_eq!(point.attributes[0].key, "method");
        assert_eq!(string_value(&point.attributes[0]), Some("GET"));
        assert_eq!(point.attributes[1].key, "status");
        assert_eq!(string_value(&point.attributes[1]), Some("200"));
    }

    #[test]
    fn test_encode_request_delta_temporality() {
        let batch = batch_with(&[0.1], Temporality::Delta);
        let request = encode_request(&batch);
        let (_, histogram) = histogram_of(&request);
        assert_eq!(
            histogram.aggregation_temporality,
            AggregationTemporality::Delta as i32
        );
    }

    #[tokio::test]
    async fn test_push_sends_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/otlp/v1/metrics"))
            .and(header("X-Scope-OrgID", "demo"))
            .and(header("content-type", "application/x-protobuf"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let exporter = OtlpExporter::new(&config_for(&server, &[])).unwrap();
        exporter
            .push(&batch_with(&[0.1], Temporality::Cumulative))
            .await
            .expect("push should succeed");

        let requests = server.received_requests().await.unwrap();
        let decoded = ExportMetricsServiceRequest::decode(requests[0].body.as_slice())
            .expect("body should be a protobuf export request");
        let (metric, histogram) = histogram_of(&decoded);
        assert_eq!(metric.name, "http_durations_histogram_seconds");
        assert_eq!(histogram.data_points[0].count, 1);
    }

    #[tokio::test]
    async fn test_push_rejected_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("out of order sample"))
            .mount(&server)
            .await;

        let exporter = OtlpExporter::new(&config_for(&server, &[])).unwrap();
        let result = exporter
            .push(&batch_with(&[0.1], Temporality::Cumulative))
            .await;

        assert!(matches!(
            result,
            Err(ExportError::Rejected { status: 400, body }) if body == "out of order sample"
        ));
    }

    #[tokio::test]
    async fn test_push_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let exporter =
            OtlpExporter::new(&config_for(&server, &[("OTLP_TIMEOUT_SECONDS", "1")])).unwrap();
        let result = exporter
            .push(&batch_with(&[0.1], Temporality::Cumulative))
            .await;

        assert!(matches!(result, Err(ExportError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_push_unreachable_collector() {
        let server = MockServer::start().await;
        let config = config_for(&server, &[]);
        drop(server);

        let exporter = OtlpExporter::new(&config).unwrap();
        let result = exporter
            .push(&batch_with(&[0.1], Temporality::Cumulative))
            .await;

        assert!(matches!(result, Err(ExportError::Transport(_))));
    }

    #[tokio::test]
    async fn test_push_skips_empty_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let exporter = OtlpExporter::new(&config_for(&server, &[])).unwrap();
        exporter
            .push(&batch_with(&[], Temporality::Cumulative))
            .await
            .unwrap();
    }

    #[test]
    fn test_describe_and_temporality() {
        let vars: HashMap<String, String> =
            [("OTLP_TEMPORALITY".to_string(), "delta".to_string())].into();
        let exporter = OtlpExporter::new(&Config::from_vars(&vars).unwrap().otlp).unwrap();
        assert_eq!(exporter.describe(), "otlp");
        assert_eq!(exporter.temporality(), Temporality::Delta);
        assert_eq!(exporter.url().as_str(), "http://mimir:8080/otlp/v1/metrics");
    }
}
