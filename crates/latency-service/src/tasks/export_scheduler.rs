//! Periodic export of the latency histogram to push exporters.
//!
//! Every tick takes one snapshot of the recorder and hands each registered
//! [`PushExporter`] a batch in the temporality it asked for. Pushes within a
//! tick run concurrently and each is bounded by the export timeout, so a
//! slow or failing exporter never delays another one.
//!
//! # Temporality
//!
//! The recorder only keeps cumulative state. Delta exporters get the
//! difference to a per-exporter baseline, which advances on every tick
//! whether the push succeeds or not: a failed delta push loses that tick's
//! data, a failed cumulative push is caught up on the next tick.
//!
//! # Graceful Shutdown
//!
//! `stop()` cancels the timer, waits for an in-flight tick for at most the
//! grace timeout (abandoning it after that), then runs one final collection
//! and flushes every exporter, again bounded by the grace timeout.

use crate::config::Config;
use crate::errors::{ExportError, SchedulerError};
use crate::exporters::{ExportBatch, Exporter, PushExporter, SeriesPoint, Temporality};
use crate::observability::metrics::{record_push, record_tick, record_tick_abandoned};
use crate::recorder::{AggregateState, LabelSet, LatencyRecorder};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn, Instrument};

/// Timing settings for the export scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Period between ticks.
    pub interval: Duration,

    /// Bound on a single push.
    pub export_timeout: Duration,

    /// Bound on waiting for an in-flight tick, and on the final flush.
    pub shutdown_grace: Duration,
}

impl SchedulerConfig {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.export_interval,
            export_timeout: config.otlp.timeout,
            shutdown_grace: config.shutdown_grace,
        }
    }
}

/// Delta baseline of one exporter.
struct Baseline {
    states: HashMap<LabelSet, AggregateState>,
    taken_at: DateTime<Utc>,
}

struct RegisteredExporter {
    exporter: Arc<dyn PushExporter>,
    baseline: Mutex<Baseline>,
}

impl RegisteredExporter {
    /// Build this exporter's batch for the snapshot, advancing its baseline.
    fn prepare_batch(
        &self,
        snapshot: &[(LabelSet, AggregateState)],
        bounds: &[f64],
        started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ExportBatch {
        match self.exporter.temporality() {
            Temporality::Cumulative => ExportBatch {
                temporality: Temporality::Cumulative,
                start_time: started_at,
                end_time: now,
                bounds: bounds.to_vec(),
                series: snapshot
                    .iter()
                    .map(|(labels, state)| SeriesPoint {
                        labels: labels.clone(),
                        state: state.clone(),
                    })
                    .collect(),
            },
            Temporality::Delta => {
                let mut baseline = self.baseline.lock();
                let empty = AggregateState::new(bounds.len());
                let series = snapshot
                    .iter()
                    .map(|(labels, state)| SeriesPoint {
                        labels: labels.clone(),
                        state: state.delta_since(baseline.states.get(labels).unwrap_or(&empty)),
                    })
                    .collect();

                let start_time = baseline.taken_at;
                baseline.states = snapshot.iter().cloned().collect();
                baseline.taken_at = now;

                ExportBatch {
                    temporality: Temporality::Delta,
                    start_time,
                    end_time: now,
                    bounds: bounds.to_vec(),
                    series,
                }
            }
        }
    }
}

struct SchedulerInner {
    recorder: Arc<LatencyRecorder>,
    exporters: Vec<RegisteredExporter>,
    config: SchedulerConfig,
    started_at: DateTime<Utc>,
}

impl SchedulerInner {
    #[instrument(skip_all, name = "latency.scheduler.tick")]
    async fn export_tick(&self) {
        let snapshot = self.recorder.snapshot();
        let bounds = self.recorder.buckets().bounds();
        let now = Utc::now();

        let pushes = self.exporters.iter().map(|registered| {
            let batch = registered.prepare_batch(&snapshot, bounds, self.started_at, now);
            self.push_one(registered, batch)
        });
        let results = join_all(pushes).await;

        let failed = results.iter().filter(|ok| !**ok).count();
        record_tick();
        debug!(
            target: "latency.scheduler",
            series = snapshot.len(),
            exporters = self.exporters.len(),
            failed,
            "Export tick complete"
        );
    }

    async fn push_one(&self, registered: &RegisteredExporter, batch: ExportBatch) -> bool {
        let exporter = registered.exporter.as_ref();
        let timeout = self.config.export_timeout;
        let started = Instant::now();

        let result = match tokio::time::timeout(timeout, exporter.push(&batch)).await {
            Ok(result) => result,
            Err(_) => Err(ExportError::Timeout(timeout)),
        };

        record_push(exporter.describe(), result.is_ok(), started.elapsed());

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    target: "latency.scheduler",
                    exporter = exporter.describe(),
                    error_kind = e.kind(),
                    error = %e,
                    "Export push failed, skipping until next tick"
                );
                false
            }
        }
    }

    async fn flush_all(&self) {
        let flushes = self.exporters.iter().map(|registered| async move {
            let exporter = registered.exporter.as_ref();
            if let Err(e) = exporter.flush().await {
                warn!(
                    target: "latency.scheduler",
                    exporter = exporter.describe(),
                    error = %e,
                    "Exporter flush failed"
                );
            }
        });
        join_all(flushes).await;
    }

    /// Timer loop; exits when the token is cancelled between ticks.
    async fn run(self: Arc<Self>, mut interval: Interval, cancel_token: CancellationToken) {
        loop {
            tokio::select! {
                // Cancellation wins over a tick that is ready at the same time.
                biased;

                _ = cancel_token.cancelled() => {
                    info!(target: "latency.scheduler", "Export scheduler received shutdown signal, exiting");
                    break;
                }
                _ = interval.tick() => {
                    self.export_tick().await;
                }
            }
        }
    }
}

enum SchedulerState {
    Stopped,
    Running {
        cancel_token: CancellationToken,
        handle: JoinHandle<()>,
    },
}

/// Drives periodic export of the shared recorder to push exporters.
///
/// Lifecycle is `Stopped -> Running -> Stopped`, and may repeat. Delta
/// baselines survive restarts.
pub struct ExportScheduler {
    inner: Arc<SchedulerInner>,
    state: Mutex<SchedulerState>,
}

impl ExportScheduler {
    #[must_use]
    pub fn new(
        recorder: Arc<LatencyRecorder>,
        exporters: Vec<Arc<dyn PushExporter>>,
        config: SchedulerConfig,
    ) -> Self {
        let started_at = Utc::now();
        let exporters = exporters
            .into_iter()
            .map(|exporter| RegisteredExporter {
                exporter,
                baseline: Mutex::new(Baseline {
                    states: HashMap::new(),
                    taken_at: started_at,
                }),
            })
            .collect();

        Self {
            inner: Arc::new(SchedulerInner {
                recorder,
                exporters,
                config,
                started_at,
            }),
            state: Mutex::new(SchedulerState::Stopped),
        }
    }

    /// Names of the registered exporters, in registration order.
    #[must_use]
    pub fn exporter_names(&self) -> Vec<String> {
        self.inner
            .exporters
            .iter()
            .map(|r| r.exporter.describe().to_string())
            .collect()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock(), SchedulerState::Running { .. })
    }

    /// Start the periodic timer. The first tick fires one interval from now.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::AlreadyRunning`] if the scheduler is running;
    /// nothing changes in that case.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        if matches!(*state, SchedulerState::Running { .. }) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let period = self.inner.config.interval;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(
            Arc::clone(&self.inner)
                .run(interval, cancel_token.clone())
                .instrument(tracing::info_span!("latency.scheduler")),
        );

        info!(
            target: "latency.scheduler",
            interval_secs = self.inner.config.interval.as_secs_f64(),
            exporters = ?self.exporter_names(),
            "Export scheduler started"
        );

        *state = SchedulerState::Running {
            cancel_token,
            handle,
        };
        Ok(())
    }

    /// Stop the timer, drain the in-flight tick, and run a final flush.
    ///
    /// No-op when already stopped. Never waits longer than twice the grace
    /// timeout.
    pub async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), SchedulerState::Stopped);
        let SchedulerState::Running {
            cancel_token,
            mut handle,
        } = previous
        else {
            debug!(target: "latency.scheduler", "Export scheduler already stopped");
            return;
        };

        let grace = self.inner.config.shutdown_grace;
        cancel_token.cancel();

        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(target: "latency.scheduler", error = %e, "Export task ended abnormally");
            }
            Err(_) => {
                handle.abort();
                record_tick_abandoned();
                warn!(
                    target: "latency.scheduler",
                    grace_secs = grace.as_secs_f64(),
                    "In-flight export tick abandoned after shutdown grace timeout"
                );
            }
        }

        let final_export = async {
            self.inner.export_tick().await;
            self.inner.flush_all().await;
        };
        if tokio::time::timeout(grace, final_export).await.is_err() {
            warn!(
                target: "latency.scheduler",
                grace_secs = grace.as_secs_f64(),
                "Final export did not complete within shutdown grace timeout"
            );
        }

        info!(target: "latency.scheduler", "Export scheduler stopped");
    }

    /// Release every exporter's resources. Call once, after [`stop`](Self::stop).
    pub async fn shutdown_exporters(&self) {
        for registered in &self.inner.exporters {
            let exporter = registered.exporter.as_ref();
            if let Err(e) = exporter.shutdown().await {
                warn!(
                    target: "latency.scheduler",
                    exporter = exporter.describe(),
                    error = %e,
                    "Exporter shutdown failed"
                );
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::recorder::Measurement;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestExporter {
        name: &'static str,
        temporality: Temporality,
        delay: Duration,
        /// Pushes left to reject before accepting.
        failures: AtomicUsize,
        batches: Mutex<Vec<ExportBatch>>,
        flushes: AtomicUsize,
    }

    impl TestExporter {
        fn build(
            name: &'static str,
            temporality: Temporality,
            delay: Duration,
            failures: usize,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                temporality,
                delay,
                failures: AtomicUsize::new(failures),
                batches: Mutex::new(Vec::new()),
                flushes: AtomicUsize::new(0),
            })
        }

        fn new(name: &'static str, temporality: Temporality) -> Arc<Self> {
            Self::build(name, temporality, Duration::ZERO, 0)
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Self::build(name, Temporality::Cumulative, Duration::ZERO, usize::MAX)
        }

        /// Rejects the first `failures` pushes, then accepts.
        fn recovering(name: &'static str, temporality: Temporality, failures: usize) -> Arc<Self> {
            Self::build(name, temporality, Duration::ZERO, failures)
        }

        fn slow(name: &'static str, delay: Duration) -> Arc<Self> {
            Self::build(name, Temporality::Cumulative, delay, 0)
        }

        fn counts(&self) -> Vec<u64> {
            self.batches.lock().iter().map(ExportBatch::total_count).collect()
        }
    }

    impl Exporter for TestExporter {
        fn describe(&self) -> &str {
            self.name
        }
    }

    #[async_trait]
    impl PushExporter for TestExporter {
        fn temporality(&self) -> Temporality {
            self.temporality
        }

        async fn push(&self, batch: &ExportBatch) -> Result<(), ExportError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let rejected = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if rejected {
                return Err(ExportError::Transport("collector unreachable".to_string()));
            }
            self.batches.lock().push(batch.clone());
            Ok(())
        }

        async fn flush(&self) -> Result<(), ExportError> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_secs(15),
            export_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(5),
        }
    }

    fn get_200() -> LabelSet {
        LabelSet::new("GET", "200")
    }

    async fn let_tasks_run() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_interval() {
        let recorder = Arc::new(LatencyRecorder::default());
        let exporter = TestExporter::new("capture", Temporality::Cumulative);
        let scheduler = ExportScheduler::new(
            Arc::clone(&recorder),
            vec![exporter.clone() as Arc<dyn PushExporter>],
            config(),
        );

        recorder.record(Measurement::new(0.1, get_200()));
        scheduler.start().unwrap();

        tokio::time::sleep(Duration::from_secs(14)).await;
        let_tasks_run().await;
        assert!(exporter.counts().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let_tasks_run().await;
        assert_eq!(exporter.counts(), vec![1]);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_delta_and_cumulative_exporters_are_independent() {
        let recorder = Arc::new(LatencyRecorder::default());
        let delta = TestExporter::new("delta", Temporality::Delta);
        let cumulative = TestExporter::new("cumulative", Temporality::Cumulative);
        let scheduler = ExportScheduler::new(
            Arc::clone(&recorder),
            vec![
                delta.clone() as Arc<dyn PushExporter>,
                cumulative.clone() as Arc<dyn PushExporter>,
            ],
            config(),
        );
        scheduler.start().unwrap();

        recorder.record(Measurement::new(0.1, get_200()));
        tokio::time::sleep(Duration::from_secs(16)).await;
        let_tasks_run().await;

        recorder.record(Measurement::new(0.2, get_200()));
        tokio::time::sleep(Duration::from_secs(15)).await;
        let_tasks_run().await;

        assert_eq!(delta.counts(), vec![1, 1]);
        assert_eq!(cumulative.counts(), vec![1, 2]);

        let batches = delta.batches.lock().clone();
        assert_eq!(batches[1].series[0].state.bucket_counts(), &[0, 0, 1, 1, 1, 1]);
        assert!((batches[1].series[0].state.sum() - 0.2).abs() < 1e-9);
        assert_eq!(batches[1].start_time, batches[0].end_time);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_exporter_does_not_block_others() {
        let recorder = Arc::new(LatencyRecorder::default());
        let failing = TestExporter::failing("failing");
        let healthy = TestExporter::new("healthy", Temporality::Cumulative);
        let scheduler = ExportScheduler::new(
            Arc::clone(&recorder),
            vec![
                failing.clone() as Arc<dyn PushExporter>,
                healthy.clone() as Arc<dyn PushExporter>,
            ],
            config(),
        );

        recorder.record(Measurement::new(0.1, get_200()));
        scheduler.start().unwrap();

        tokio::time::sleep(Duration::from_secs(31)).await;
        let_tasks_run().await;

        assert!(failing.counts().is_empty());
        assert_eq!(healthy.counts(), vec![1, 1]);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_exporter_times_out_without_delaying_others() {
        let recorder = Arc::new(LatencyRecorder::default());
        let slow = TestExporter::slow("slow", Duration::from_secs(60));
        let fast = TestExporter::new("fast", Temporality::Cumulative);
        let scheduler = ExportScheduler::new(
            Arc::clone(&recorder),
            vec![
                slow.clone() as Arc<dyn PushExporter>,
                fast.clone() as Arc<dyn PushExporter>,
            ],
            config(),
        );

        recorder.record(Measurement::new(0.1, get_200()));
        scheduler.start().unwrap();

        // Tick at 15s: fast delivers immediately, slow is cut off at 25s.
        tokio::time::sleep(Duration::from_secs(16)).await;
        let_tasks_run().await;
        assert_eq!(fast.counts(), vec![1]);

        tokio::time::sleep(Duration::from_secs(10)).await;
        let_tasks_run().await;
        assert!(slow.counts().is_empty());

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_rejected() {
        let scheduler = ExportScheduler::new(
            Arc::new(LatencyRecorder::default()),
            vec![TestExporter::new("capture", Temporality::Cumulative) as Arc<dyn PushExporter>],
            config(),
        );

        scheduler.start().unwrap();
        assert_eq!(scheduler.start(), Err(SchedulerError::AlreadyRunning));
        assert!(scheduler.is_running());

        scheduler.stop().await;
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_when_stopped_is_noop() {
        let exporter = TestExporter::new("capture", Temporality::Cumulative);
        let scheduler = ExportScheduler::new(
            Arc::new(LatencyRecorder::default()),
            vec![exporter.clone() as Arc<dyn PushExporter>],
            config(),
        );

        scheduler.stop().await;
        assert_eq!(exporter.flushes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_runs_final_collection_and_flush() {
        let recorder = Arc::new(LatencyRecorder::default());
        let exporter = TestExporter::new("capture", Temporality::Cumulative);
        let scheduler = ExportScheduler::new(
            Arc::clone(&recorder),
            vec![exporter.clone() as Arc<dyn PushExporter>],
            config(),
        );

        scheduler.start().unwrap();
        recorder.record(Measurement::new(0.1, get_200()));
        recorder.record(Measurement::new(0.1, get_200()));

        // Stop before the first tick: the final collection still exports.
        scheduler.stop().await;

        assert_eq!(exporter.counts(), vec![2]);
        assert_eq!(exporter.flushes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_in_flight_tick() {
        let recorder = Arc::new(LatencyRecorder::default());
        let exporter = TestExporter::slow("slow", Duration::from_secs(2));
        let scheduler = ExportScheduler::new(
            Arc::clone(&recorder),
            vec![exporter.clone() as Arc<dyn PushExporter>],
            config(),
        );

        recorder.record(Measurement::new(0.1, get_200()));
        scheduler.start().unwrap();

        // Tick starts at 15s and is in flight until 17s.
        tokio::time::sleep(Duration::from_millis(15_500)).await;
        let_tasks_run().await;
        assert!(exporter.counts().is_empty());

        scheduler.stop().await;

        // In-flight tick plus final collection.
        assert_eq!(exporter.counts(), vec![1, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_abandons_tick_after_grace_timeout() {
        let recorder = Arc::new(LatencyRecorder::default());
        let exporter = TestExporter::slow("stuck", Duration::from_secs(3600));
        let scheduler = ExportScheduler::new(
            Arc::clone(&recorder),
            vec![exporter.clone() as Arc<dyn PushExporter>],
            SchedulerConfig {
                export_timeout: Duration::from_secs(7200),
                ..config()
            },
        );

        recorder.record(Measurement::new(0.1, get_200()));
        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_secs(16)).await;
        let_tasks_run().await;

        let started = Instant::now();
        scheduler.stop().await;
        let waited = started.elapsed();

        // Grace for the in-flight tick plus grace for the final export.
        assert!(waited <= Duration::from_secs(10), "stop waited {waited:?}");
        assert!(waited >= Duration::from_secs(5), "stop waited {waited:?}");
        assert!(exporter.counts().is_empty());
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_wins_over_due_tick() {
        let recorder = Arc::new(LatencyRecorder::default());
        let exporter = TestExporter::new("capture", Temporality::Cumulative);
        let scheduler = ExportScheduler::new(
            Arc::clone(&recorder),
            vec![exporter.clone() as Arc<dyn PushExporter>],
            config(),
        );
        recorder.record(Measurement::new(0.1, get_200()));

        let cancel_token = CancellationToken::new();
        cancel_token.cancel();

        // Both branches are ready on the first poll; repeat so an unbiased
        // select would pick the tick at least once.
        for _ in 0..20 {
            // The first tick of a plain interval is due immediately.
            let interval = tokio::time::interval(Duration::from_secs(15));
            Arc::clone(&scheduler.inner)
                .run(interval, cancel_token.clone())
                .await;
        }

        assert!(exporter.counts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_delta_push_drops_that_interval() {
        let recorder = Arc::new(LatencyRecorder::default());
        let delta = TestExporter::recovering("delta", Temporality::Delta, 1);
        let cumulative = TestExporter::recovering("cumulative", Temporality::Cumulative, 1);
        let scheduler = ExportScheduler::new(
            Arc::clone(&recorder),
            vec![
                delta.clone() as Arc<dyn PushExporter>,
                cumulative.clone() as Arc<dyn PushExporter>,
            ],
            config(),
        );
        scheduler.start().unwrap();

        // Tick 1 is rejected by both exporters.
        recorder.record(Measurement::new(0.1, get_200()));
        tokio::time::sleep(Duration::from_secs(16)).await;
        let_tasks_run().await;
        assert!(delta.counts().is_empty());
        assert!(cumulative.counts().is_empty());

        // Tick 2 is accepted.
        recorder.record(Measurement::new(0.2, get_200()));
        tokio::time::sleep(Duration::from_secs(15)).await;
        let_tasks_run().await;

        // The delta baseline moved past tick 1, so only tick 2's value is sent.
        let batches = delta.batches.lock().clone();
        assert_eq!(batches.len(), 1);
        let point = &batches[0].series[0];
        assert_eq!(point.state.count(), 1);
        assert!((point.state.sum() - 0.2).abs() < 1e-9);
        assert_eq!(point.state.bucket_counts(), &[0, 0, 1, 1, 1, 1]);

        // Cumulative catches up on everything.
        assert_eq!(cumulative.counts(), vec![2]);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_keeps_delta_baseline() {
        let recorder = Arc::new(LatencyRecorder::default());
        let delta = TestExporter::new("delta", Temporality::Delta);
        let scheduler = ExportScheduler::new(
            Arc::clone(&recorder),
            vec![delta.clone() as Arc<dyn PushExporter>],
            config(),
        );

        recorder.record(Measurement::new(0.1, get_200()));
        scheduler.start().unwrap();
        scheduler.stop().await;

        recorder.record(Measurement::new(0.1, get_200()));
        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_secs(16)).await;
        let_tasks_run().await;
        scheduler.stop().await;

        // Final collection of the first run, one tick, then a final collection
        // with nothing new.
        assert_eq!(delta.counts(), vec![1, 1, 0]);
    }

    #[tokio::test]
    async fn test_shutdown_exporters_calls_each_exporter() {
        struct ShutdownCounter(AtomicUsize);

        impl Exporter for ShutdownCounter {
            fn describe(&self) -> &str {
                "counter"
            }
        }

        #[async_trait]
        impl PushExporter for ShutdownCounter {
            fn temporality(&self) -> Temporality {
                Temporality::Cumulative
            }

            async fn push(&self, _batch: &ExportBatch) -> Result<(), ExportError> {
                Ok(())
            }

            async fn shutdown(&self) -> Result<(), ExportError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let exporter = Arc::new(ShutdownCounter(AtomicUsize::new(0)));
        let scheduler = ExportScheduler::new(
            Arc::new(LatencyRecorder::default()),
            vec![exporter.clone() as Arc<dyn PushExporter>, exporter.clone()],
            config(),
        );

        scheduler.shutdown_exporters().await;
        assert_eq!(exporter.0.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.exporter_names(), vec!["counter", "counter"]);
    }
}
