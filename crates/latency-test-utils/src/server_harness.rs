//! Test server harness for E2E testing
//!
//! Provides `TestLatencyServer` for spawning real latency service instances
//! in tests, wired to caller-supplied push exporters.

use latency_service::config::Config;
use latency_service::exporters::PushExporter;
use latency_service::{LatencyRecorder, Service, ServiceError};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Test harness for spawning the latency service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// let server = TestLatencyServer::spawn(&[("LATENCY_EXPORTERS", "prometheus")], vec![]).await?;
/// let response = reqwest::get(format!("{}/metrics", server.url())).await?;
/// assert_eq!(response.status(), 200);
/// ```
pub struct TestLatencyServer {
    addr: SocketAddr,
    config: Config,
    recorder: Arc<LatencyRecorder>,
    shutdown_token: CancellationToken,
    handle: Option<JoinHandle<Result<(), ServiceError>>>,
}

impl TestLatencyServer {
    /// Spawn a new test server instance.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start the export scheduler with `push_exporters`
    /// - Serve HTTP in the background until [`shutdown`](Self::shutdown)
    ///
    /// `vars` override the environment-style configuration. The configured
    /// exporter selection only controls the scrape route; push exporters
    /// are exactly the ones passed in.
    pub async fn spawn(
        vars: &[(&str, &str)],
        push_exporters: Vec<Arc<dyn PushExporter>>,
    ) -> Result<Self, anyhow::Error> {
        let mut env: HashMap<String, String> = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("LATENCY_EXPORTERS".to_string(), "prometheus".to_string()),
        ]);
        for (key, value) in vars {
            env.insert((*key).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&env)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let service = Service::with_exporters(&config, push_exporters, None);
        let recorder = service.recorder();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let shutdown_token = CancellationToken::new();
        let handle = tokio::spawn(service.run(listener, shutdown_token.clone().cancelled_owned()));

        Ok(Self {
            addr,
            config,
            recorder,
            shutdown_token,
            handle: Some(handle),
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared recorder behind the running service.
    pub fn recorder(&self) -> &Arc<LatencyRecorder> {
        &self.recorder
    }

    /// Trigger graceful shutdown and wait for the service to finish draining.
    pub async fn shutdown(mut self) -> Result<(), anyhow::Error> {
        self.shutdown_token.cancel();
        match self.handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| anyhow::anyhow!("Service task failed: {}", e))?
                .map_err(|e| anyhow::anyhow!("Service returned error: {}", e)),
            None => Ok(()),
        }
    }
}

impl Drop for TestLatencyServer {
    fn drop(&mut self) {
        // Abort the server task if the test did not shut it down.
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_spawns_successfully() -> Result<(), anyhow::Error> {
        let server = TestLatencyServer::spawn(&[], vec![]).await?;

        assert!(server.url().starts_with("http://127.0.0.1:"));

        let response = reqwest::get(format!("{}/users/abc", server.url())).await?;
        assert_eq!(response.status(), 200);

        let body: serde_json::Value = response.json().await?;
        assert_eq!(body["id"], "abc");

        server.shutdown().await
    }

    #[tokio::test]
    async fn test_server_provides_addr() -> Result<(), anyhow::Error> {
        let server = TestLatencyServer::spawn(&[], vec![]).await?;

        let addr = server.addr();
        assert!(addr.ip().is_loopback());
        assert!(addr.port() > 0);
        assert_eq!(server.url(), format!("http://{}", addr));

        server.shutdown().await
    }
}
