//! Latency service configuration.
//!
//! Configuration is loaded from environment variables and validated eagerly:
//! a misconfigured exporter is a startup failure, never a runtime one.
//! Collector header values may carry credentials and are redacted in Debug
//! output.

use crate::exporters::Temporality;
use crate::recorder::HistogramBuckets;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default OTLP collector endpoint (host:port).
pub const DEFAULT_OTLP_ENDPOINT: &str = "mimir:8080";

/// Default OTLP metrics path on the collector.
pub const DEFAULT_OTLP_URL_PATH: &str = "/otlp/v1/metrics";

/// Default collector headers (tenant routing for multi-tenant backends).
pub const DEFAULT_OTLP_HEADERS: &str = "X-Scope-OrgID=demo";

/// Default per-push timeout in seconds.
pub const DEFAULT_OTLP_TIMEOUT_SECONDS: u64 = 10;

/// Default scrape route.
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

/// Prefix of the business routes; the scrape route must stay outside it.
const BUSINESS_ROUTE_PREFIX: &str = "/users";

/// Default export interval in seconds.
pub const DEFAULT_EXPORT_INTERVAL_SECONDS: u64 = 15;

/// Default bound on shutdown drain and final flush, in seconds.
pub const DEFAULT_SHUTDOWN_GRACE_SECONDS: u64 = 5;

/// Default fault-injection delay in milliseconds.
pub const DEFAULT_INJECTED_DELAY_MS: u64 = 200;

/// Exporter backends that can be enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExporterKind {
    /// Push to a remote OTLP/HTTP collector.
    Otlp,
    /// Serve a Prometheus scrape route.
    Prometheus,
    /// Write to stdout for local debugging.
    Stdout,
}

impl ExporterKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ExporterKind::Otlp => "otlp",
            ExporterKind::Prometheus => "prometheus",
            ExporterKind::Stdout => "stdout",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "otlp" => Some(ExporterKind::Otlp),
            "prometheus" => Some(ExporterKind::Prometheus),
            "stdout" => Some(ExporterKind::Stdout),
            _ => None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// A header attached to every OTLP push.
#[derive(Clone)]
pub struct CollectorHeader {
    /// Header name (validated).
    pub name: String,

    /// Header value (validated, redacted in Debug).
    pub value: SecretString,
}

impl fmt::Debug for CollectorHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorHeader")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Remote collector settings for the OTLP push exporter.
#[derive(Debug, Clone)]
pub struct OtlpConfig {
    /// Collector host and port (e.g., "mimir:8080").
    pub endpoint: String,

    /// Collector URL path (e.g., "/otlp/v1/metrics").
    pub url_path: String,

    /// Plaintext HTTP when true, HTTPS otherwise.
    pub insecure: bool,

    /// Fixed routing/auth headers.
    pub headers: Vec<CollectorHeader>,

    /// Aggregation temporality the collector expects.
    pub temporality: Temporality,

    /// Per-push timeout.
    pub timeout: Duration,

    /// Fully resolved collector URL.
    pub url: Url,
}

/// Latency service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Enabled exporter backends, never empty, without duplicates.
    pub exporters: Vec<ExporterKind>,

    /// OTLP collector settings (used when `otlp` is enabled).
    pub otlp: OtlpConfig,

    /// Temporality of the stdout sink.
    pub stdout_temporality: Temporality,

    /// Scrape route path (used when `prometheus` is enabled).
    pub metrics_path: String,

    /// Period between export ticks.
    pub export_interval: Duration,

    /// Histogram bucket upper bounds in seconds.
    pub buckets: HistogramBuckets,

    /// Bound on waiting for an in-flight tick and on the final flush.
    pub shutdown_grace: Duration,

    /// Percentage of requests (0-100) that get the injected delay.
    pub injected_delay_percent: u8,

    /// Injected delay length.
    pub injected_delay: Duration,

    /// Log output format.
    pub log_format: LogFormat,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid exporter selection: {0}")]
    InvalidExporters(String),

    #[error("Invalid OTLP collector configuration: {0}")]
    InvalidCollector(String),

    #[error("Invalid collector header: {0}")]
    InvalidHeader(String),

    #[error("Invalid temporality: {0}")]
    InvalidTemporality(String),

    #[error("Invalid histogram buckets: {0}")]
    InvalidBuckets(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let exporters = parse_exporters(
            vars.get("LATENCY_EXPORTERS")
                .map(String::as_str)
                .unwrap_or("otlp"),
        )?;

        let otlp = parse_otlp(vars)?;

        let stdout_temporality = parse_temporality(vars, "STDOUT_TEMPORALITY")?;

        let metrics_path = parse_metrics_path(
            vars.get("METRICS_PATH")
                .map(String::as_str)
                .unwrap_or(DEFAULT_METRICS_PATH),
        )?;

        let export_interval = Duration::from_secs(parse_positive_secs(
            vars,
            "EXPORT_INTERVAL_SECONDS",
            DEFAULT_EXPORT_INTERVAL_SECONDS,
        )?);

        let buckets = match vars.get("HISTOGRAM_BUCKETS") {
            Some(value) => parse_buckets(value)?,
            None => HistogramBuckets::default(),
        };

        let shutdown_grace = Duration::from_secs(parse_positive_secs(
            vars,
            "SHUTDOWN_GRACE_SECONDS",
            DEFAULT_SHUTDOWN_GRACE_SECONDS,
        )?);

        let injected_delay_percent = match vars.get("INJECTED_DELAY_PERCENT") {
            Some(value_str) => {
                let value: u8 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidValue(format!(
                        "INJECTED_DELAY_PERCENT must be an integer between 0 and 100, got '{}': {}",
                        value_str, e
                    ))
                })?;
                if value > 100 {
                    return Err(ConfigError::InvalidValue(format!(
                        "INJECTED_DELAY_PERCENT must not exceed 100, got {}",
                        value
                    )));
                }
                value
            }
            None => 0,
        };

        let injected_delay = match vars.get("INJECTED_DELAY_MS") {
            Some(value_str) => Duration::from_millis(value_str.parse().map_err(|e| {
                ConfigError::InvalidDuration(format!(
                    "INJECTED_DELAY_MS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?),
            None => Duration::from_millis(DEFAULT_INJECTED_DELAY_MS),
        };

        let log_format = match vars.get("LOG_FORMAT").map(String::as_str) {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidValue(format!(
                    "LOG_FORMAT must be 'text' or 'json', got '{}'",
                    other
                )))
            }
        };

        Ok(Config {
            bind_address,
            exporters,
            otlp,
            stdout_temporality,
            metrics_path,
            export_interval,
            buckets,
            shutdown_grace,
            injected_delay_percent,
            injected_delay,
            log_format,
        })
    }

    /// Whether the given exporter backend is enabled.
    #[must_use]
    pub fn is_enabled(&self, kind: ExporterKind) -> bool {
        self.exporters.contains(&kind)
    }
}

/// Validate the scrape route so it can be registered next to the business
/// routes without conflict.
fn parse_metrics_path(value: &str) -> Result<String, ConfigError> {
    if !value.starts_with('/') {
        return Err(ConfigError::InvalidValue(format!(
            "METRICS_PATH must start with '/', got '{}'",
            value
        )));
    }
    if value.contains([':', '*']) {
        return Err(ConfigError::InvalidValue(format!(
            "METRICS_PATH must be a literal path without ':' or '*' segments, got '{}'",
            value
        )));
    }
    let overlaps_business_route = value
        .strip_prefix(BUSINESS_ROUTE_PREFIX)
        .is_some_and(|rest| rest.starts_with('/'));
    if overlaps_business_route {
        return Err(ConfigError::InvalidValue(format!(
            "METRICS_PATH must not be under '{}/', got '{}'",
            BUSINESS_ROUTE_PREFIX, value
        )));
    }
    Ok(value.to_string())
}

fn parse_exporters(value: &str) -> Result<Vec<ExporterKind>, ConfigError> {
    let mut exporters = Vec::new();
    for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let kind = ExporterKind::parse(&name.to_ascii_lowercase()).ok_or_else(|| {
            ConfigError::InvalidExporters(format!(
                "unknown exporter '{}', expected one of otlp, prometheus, stdout",
                name
            ))
        })?;
        if !exporters.contains(&kind) {
            exporters.push(kind);
        }
    }

    if exporters.is_empty() {
        return Err(ConfigError::InvalidExporters(
            "LATENCY_EXPORTERS must name at least one exporter".to_string(),
        ));
    }

    Ok(exporters)
}

fn parse_otlp(vars: &HashMap<String, String>) -> Result<OtlpConfig, ConfigError> {
    let endpoint = vars
        .get("OTLP_ENDPOINT")
        .cloned()
        .unwrap_or_else(|| DEFAULT_OTLP_ENDPOINT.to_string());

    let url_path = vars
        .get("OTLP_URL_PATH")
        .cloned()
        .unwrap_or_else(|| DEFAULT_OTLP_URL_PATH.to_string());

    let insecure = match vars.get("OTLP_INSECURE").map(String::as_str) {
        None | Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        Some(other) => {
            return Err(ConfigError::InvalidValue(format!(
                "OTLP_INSECURE must be true or false, got '{}'",
                other
            )))
        }
    };

    let headers = parse_headers(
        vars.get("OTLP_HEADERS")
            .map(String::as_str)
            .unwrap_or(DEFAULT_OTLP_HEADERS),
    )?;

    let temporality = parse_temporality(vars, "OTLP_TEMPORALITY")?;

    let timeout = Duration::from_secs(parse_positive_secs(
        vars,
        "OTLP_TIMEOUT_SECONDS",
        DEFAULT_OTLP_TIMEOUT_SECONDS,
    )?);

    let url = collector_url(&endpoint, &url_path, insecure)?;

    Ok(OtlpConfig {
        endpoint,
        url_path,
        insecure,
        headers,
        temporality,
        timeout,
        url,
    })
}

/// Build the collector URL from host:port, path and security mode.
fn collector_url(endpoint: &str, url_path: &str, insecure: bool) -> Result<Url, ConfigError> {
    if endpoint.is_empty() || endpoint.contains("://") {
        return Err(ConfigError::InvalidCollector(format!(
            "OTLP_ENDPOINT must be host:port without a scheme, got '{}'",
            endpoint
        )));
    }
    if !url_path.starts_with('/') {
        return Err(ConfigError::InvalidCollector(format!(
            "OTLP_URL_PATH must start with '/', got '{}'",
            url_path
        )));
    }

    let scheme = if insecure { "http" } else { "https" };
    let raw = format!("{}://{}{}", scheme, endpoint, url_path);
    let url = Url::parse(&raw).map_err(|e| {
        ConfigError::InvalidCollector(format!("'{}' is not a valid URL: {}", raw, e))
    })?;

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidCollector(format!(
            "'{}' has no host",
            raw
        )));
    }

    Ok(url)
}

fn parse_headers(value: &str) -> Result<Vec<CollectorHeader>, ConfigError> {
    let mut headers = Vec::new();
    for entry in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, header_value) = entry.split_once('=').ok_or_else(|| {
            ConfigError::InvalidHeader(format!("expected name=value, got '{}'", entry))
        })?;
        let name = name.trim();
        let header_value = header_value.trim();

        HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ConfigError::InvalidHeader(format!("'{}' is not a valid header name", name)))?;
        HeaderValue::from_str(header_value).map_err(|_| {
            ConfigError::InvalidHeader(format!("value for '{}' is not a valid header value", name))
        })?;

        headers.push(CollectorHeader {
            name: name.to_string(),
            value: SecretString::from(header_value.to_string()),
        });
    }
    Ok(headers)
}

fn parse_temporality(
    vars: &HashMap<String, String>,
    key: &str,
) -> Result<Temporality, ConfigError> {
    match vars.get(key) {
        Some(value) => value.parse().map_err(|e: String| {
            ConfigError::InvalidTemporality(format!("{} {}", key, e))
        }),
        None => Ok(Temporality::Cumulative),
    }
}

fn parse_positive_secs(
    vars: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(key) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| {
        ConfigError::InvalidDuration(format!(
            "{} must be a valid positive integer, got '{}': {}",
            key, value_str, e
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidDuration(format!(
            "{} must be greater than 0",
            key
        )));
    }

    Ok(value)
}

fn parse_buckets(value: &str) -> Result<HistogramBuckets, ConfigError> {
    let bounds = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>().map_err(|e| {
                ConfigError::InvalidBuckets(format!("'{}' is not a number: {}", s, e))
            })
        })
        .collect::<Result<Vec<f64>, ConfigError>>()?;

    HistogramBuckets::new(bounds).map_err(|e| ConfigError::InvalidBuckets(e.to_string()))
}

impl OtlpConfig {
    /// Header pairs with secret values exposed, for building requests.
    pub(crate) fn exposed_headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .map(|h| (h.name.as_str(), h.value.expose_secret()))
    }
}
