//! Service lifecycle.
//!
//! Startup order: recorder, exporters (any failure is fatal), scheduler,
//! then bind and serve. On shutdown the HTTP server drains first, then the
//! scheduler stops (final collection and flush), then every push exporter
//! is shut down.

use crate::config::{Config, ExporterKind};
use crate::errors::ServiceError;
use crate::exporters::{OtlpExporter, PrometheusExporter, PushExporter, StdoutExporter};
use crate::middleware::policy_from_config;
use crate::recorder::LatencyRecorder;
use crate::routes::{build_routes, AppState, ScrapeRoute};
use crate::tasks::{ExportScheduler, SchedulerConfig};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Construct the push exporters enabled in configuration.
///
/// # Errors
///
/// Returns `ServiceError::ExporterInit` if any exporter cannot be built.
pub fn build_push_exporters(config: &Config) -> Result<Vec<Arc<dyn PushExporter>>, ServiceError> {
    let mut exporters: Vec<Arc<dyn PushExporter>> = Vec::new();

    for kind in &config.exporters {
        match kind {
            ExporterKind::Otlp => {
                let exporter = OtlpExporter::new(&config.otlp).map_err(|e| {
                    error!(target: "latency.service", error = %e, "Failed to build OTLP exporter");
                    ServiceError::ExporterInit(format!("otlp: {e}"))
                })?;
                info!(
                    target: "latency.service",
                    url = %exporter.url(),
                    temporality = %config.otlp.temporality,
                    "OTLP exporter configured"
                );
                exporters.push(Arc::new(exporter));
            }
            ExporterKind::Stdout => {
                exporters.push(Arc::new(StdoutExporter::new(config.stdout_temporality)));
            }
            // Pull exporter, served by the router instead.
            ExporterKind::Prometheus => {}
        }
    }

    Ok(exporters)
}

/// A fully wired latency service, ready to serve.
pub struct Service {
    recorder: Arc<LatencyRecorder>,
    scheduler: ExportScheduler,
    router: Router,
}

impl Service {
    /// Build the service and every exporter named in configuration.
    ///
    /// `self_metrics` is appended to scrape output when the pull exporter is
    /// enabled.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::ExporterInit` if an exporter cannot be built.
    pub fn from_config(
        config: &Config,
        self_metrics: Option<PrometheusHandle>,
    ) -> Result<Self, ServiceError> {
        let push_exporters = build_push_exporters(config)?;
        Ok(Self::with_exporters(config, push_exporters, self_metrics))
    }

    /// Build the service with an explicit set of push exporters.
    ///
    /// The pull exporter is still taken from configuration.
    #[must_use]
    pub fn with_exporters(
        config: &Config,
        push_exporters: Vec<Arc<dyn PushExporter>>,
        self_metrics: Option<PrometheusHandle>,
    ) -> Self {
        let recorder = Arc::new(LatencyRecorder::new(config.buckets.clone()));

        let scrape = config.is_enabled(ExporterKind::Prometheus).then(|| {
            let exporter = PrometheusExporter::new(Arc::clone(&recorder));
            ScrapeRoute {
                path: config.metrics_path.clone(),
                exporter: match self_metrics {
                    Some(handle) => exporter.with_self_metrics(handle),
                    None => exporter,
                },
            }
        });

        let router = build_routes(AppState {
            recorder: Arc::clone(&recorder),
            delay_policy: policy_from_config(config),
            scrape,
        });

        let scheduler = ExportScheduler::new(
            Arc::clone(&recorder),
            push_exporters,
            SchedulerConfig::from_config(config),
        );

        Self {
            recorder,
            scheduler,
            router,
        }
    }

    /// Shared recorder written by the latency middleware.
    #[must_use]
    pub fn recorder(&self) -> Arc<LatencyRecorder> {
        Arc::clone(&self.recorder)
    }

    /// Router with every route and layer applied.
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Start exporting, serve until `shutdown` resolves, then drain.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Scheduler` if the scheduler cannot start and
    /// `ServiceError::Io` if serving fails. Exporters are stopped either way
    /// once serving has begun.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServiceError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.scheduler.start()?;

        let addr = listener.local_addr()?;
        info!(target: "latency.service", %addr, "Latency service listening");

        let served = axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await;

        if let Err(e) = &served {
            error!(target: "latency.service", error = %e, "HTTP server failed");
        }

        info!(target: "latency.service", "HTTP server stopped, draining exporters");
        self.scheduler.stop().await;
        self.scheduler.shutdown_exporters().await;
        info!(target: "latency.service", "Latency service shutdown complete");

        served.map_err(ServiceError::from)
    }
}
