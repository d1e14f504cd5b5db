//! Latency Service
//!
//! Demo HTTP service whose request latencies are exported as a histogram.

use latency_service::config::{Config, ExporterKind, LogFormat};
use latency_service::observability::{logging, metrics};
use latency_service::Service;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Config decides the log format, so load it before tracing and report
    // a failure once the subscriber is up.
    let config = Config::from_env();
    let log_format = config
        .as_ref()
        .map(|c| c.log_format)
        .unwrap_or(LogFormat::Text);
    logging::init_tracing(log_format)?;

    info!("Starting Latency Service");

    let config = config.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        exporters = ?config.exporters,
        export_interval_secs = config.export_interval.as_secs(),
        injected_delay_percent = config.injected_delay_percent,
        "Configuration loaded successfully"
    );

    let self_metrics = if config.is_enabled(ExporterKind::Prometheus) {
        Some(metrics::init_metrics_recorder().map_err(|e| {
            error!("Failed to initialize metrics recorder: {}", e);
            e
        })?)
    } else {
        None
    };

    let service = Service::from_config(&config, self_metrics).map_err(|e| {
        error!("Failed to build service: {}", e);
        e
    })?;

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    service.run(listener, shutdown_signal()).await?;

    info!("Latency Service shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
