//! Push exporter test doubles.

use async_trait::async_trait;
use latency_service::exporters::{ExportBatch, Exporter, PushExporter, Temporality};
use latency_service::ExportError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Records every batch it receives.
pub struct CapturingExporter {
    name: String,
    temporality: Temporality,
    batches: Mutex<Vec<ExportBatch>>,
    flushes: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl CapturingExporter {
    pub fn new(name: impl Into<String>, temporality: Temporality) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            temporality,
            batches: Mutex::new(Vec::new()),
            flushes: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
        })
    }

    pub fn cumulative() -> Arc<Self> {
        Self::new("capture-cumulative", Temporality::Cumulative)
    }

    pub fn delta() -> Arc<Self> {
        Self::new("capture-delta", Temporality::Delta)
    }

    /// Every batch received so far, in order.
    pub fn batches(&self) -> Vec<ExportBatch> {
        self.batches.lock().clone()
    }

    /// Total measurement count of each received batch, in order.
    pub fn counts(&self) -> Vec<u64> {
        self.batches.lock().iter().map(ExportBatch::total_count).collect()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl Exporter for CapturingExporter {
    fn describe(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl PushExporter for CapturingExporter {
    fn temporality(&self) -> Temporality {
        self.temporality
    }

    async fn push(&self, batch: &ExportBatch) -> Result<(), ExportError> {
        self.batches.lock().push(batch.clone());
        Ok(())
    }

    async fn flush(&self) -> Result<(), ExportError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ExportError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails every push with a transport error.
pub struct FailingExporter {
    attempts: AtomicUsize,
}

impl FailingExporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            attempts: AtomicUsize::new(0),
        })
    }

    /// Number of pushes attempted so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Exporter for FailingExporter {
    fn describe(&self) -> &str {
        "failing"
    }
}

#[async_trait]
impl PushExporter for FailingExporter {
    fn temporality(&self) -> Temporality {
        Temporality::Cumulative
    }

    async fn push(&self, _batch: &ExportBatch) -> Result<(), ExportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ExportError::Transport("connection refused".to_string()))
    }
}

/// Sleeps before accepting every push.
pub struct SlowExporter {
    delay: Duration,
    started: AtomicUsize,
    completed: AtomicUsize,
}

impl SlowExporter {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            started: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        })
    }

    /// Pushes that have begun.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Pushes that ran to completion.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

impl Exporter for SlowExporter {
    fn describe(&self) -> &str {
        "slow"
    }
}

#[async_trait]
impl PushExporter for SlowExporter {
    fn temporality(&self) -> Temporality {
        Temporality::Cumulative
    }

    async fn push(&self, _batch: &ExportBatch) -> Result<(), ExportError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
