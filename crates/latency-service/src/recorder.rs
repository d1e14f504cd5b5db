//! Request latency histogram accumulator.
//!
//! The [`LatencyRecorder`] is the single piece of shared mutable state in the
//! service. Request tasks write to it through the latency middleware, the
//! export scheduler and the scrape route read from it.
//!
//! # Locking
//!
//! ```text
//! RwLock<HashMap<LabelSet, Arc<Mutex<AggregateState>>>>
//!   read  - every record() and snapshot()
//!   write - only when a LabelSet is seen for the first time
//! Mutex  - one per LabelSet, held for a single bucket/sum/count update
//! ```
//!
//! Label cardinality is bounded (method x status), so entries are created
//! lazily and never removed.
//!
//! # Bucket semantics
//!
//! Bucket counts are cumulative: a value `v` increments every bucket whose
//! upper bound is `>= v`. Values above the largest bound only land in the
//! implicit `+Inf` bucket, which always equals `count`.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default histogram bucket upper bounds in seconds.
pub const DEFAULT_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.0];

/// Label value used when a method or status cannot be determined.
pub const FALLBACK_LABEL: &str = "";

/// Fixed label schema for request latency measurements.
///
/// Field order defines both the serialization order of the labels and the
/// sort order of snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LabelSet {
    method: String,
    status: String,
}

impl LabelSet {
    /// Create a label set from an HTTP method and status code string.
    pub fn new(method: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            status: status.into(),
        }
    }

    /// HTTP method label (e.g. "GET").
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// HTTP status code label (e.g. "200").
    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Label pairs in their deterministic serialization order.
    #[must_use]
    pub fn pairs(&self) -> [(&'static str, &str); 2] {
        [("method", &self.method), ("status", &self.status)]
    }
}

/// One completed request's latency.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    value: f64,
    labels: LabelSet,
}

impl Measurement {
    /// Create a measurement from a value in seconds.
    ///
    /// Negative and non-finite values are clamped to `0.0` so that
    /// [`LatencyRecorder::record`] stays total.
    #[must_use]
    pub fn new(value: f64, labels: LabelSet) -> Self {
        let value = if value.is_finite() && value > 0.0 {
            value
        } else {
            0.0
        };
        Self { value, labels }
    }

    /// Create a measurement from an elapsed duration.
    #[must_use]
    pub fn from_duration(elapsed: Duration, labels: LabelSet) -> Self {
        Self::new(elapsed.as_secs_f64(), labels)
    }

    /// Latency in seconds.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Labels of this measurement.
    #[must_use]
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }
}

/// Errors produced when validating bucket boundaries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BucketError {
    #[error("at least one bucket boundary is required")]
    Empty,

    #[error("bucket boundary must be finite, got {0}")]
    NonFinite(f64),

    #[error("bucket boundary must be positive, got {0}")]
    NonPositive(f64),

    #[error("bucket boundaries must be strictly increasing, got {next} after {previous}")]
    NotIncreasing { previous: f64, next: f64 },
}

/// Ordered histogram upper bounds, fixed for the lifetime of a recorder.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBuckets(Arc<[f64]>);

impl HistogramBuckets {
    /// Validate and freeze a list of bucket upper bounds.
    ///
    /// # Errors
    ///
    /// Returns [`BucketError`] if the list is empty, contains non-finite or
    /// non-positive values, or is not strictly increasing.
    pub fn new(bounds: Vec<f64>) -> Result<Self, BucketError> {
        if bounds.is_empty() {
            return Err(BucketError::Empty);
        }

        let mut previous: Option<f64> = None;
        for &bound in &bounds {
            if !bound.is_finite() {
                return Err(BucketError::NonFinite(bound));
            }
            if bound <= 0.0 {
                return Err(BucketError::NonPositive(bound));
            }
            if let Some(prev) = previous {
                if bound <= prev {
                    return Err(BucketError::NotIncreasing {
                        previous: prev,
                        next: bound,
                    });
                }
            }
            previous = Some(bound);
        }

        Ok(Self(bounds.into()))
    }

    /// Upper bounds in ascending order.
    #[must_use]
    pub fn bounds(&self) -> &[f64] {
        &self.0
    }

    /// Number of explicit buckets (the `+Inf` bucket is not counted).
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index of the first bucket whose bound is `>= value`.
    ///
    /// Returns `len()` when the value exceeds every bound.
    fn first_bucket(&self, value: f64) -> usize {
        self.0.partition_point(|bound| *bound < value)
    }
}

impl Default for HistogramBuckets {
    fn default() -> Self {
        Self(DEFAULT_BUCKETS.into())
    }
}

/// Histogram state for one [`LabelSet`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateState {
    bucket_counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl AggregateState {
    /// Empty state with one cumulative counter per bucket bound.
    #[must_use]
    pub fn new(bucket_len: usize) -> Self {
        Self {
            bucket_counts: vec![0; bucket_len],
            sum: 0.0,
            count: 0,
        }
    }

    fn observe(&mut self, first_bucket: usize, value: f64) {
        for bucket in self.bucket_counts.iter_mut().skip(first_bucket) {
            *bucket = bucket.saturating_add(1);
        }
        self.sum += value;
        self.count = self.count.saturating_add(1);
    }

    /// Cumulative count per bucket bound (Prometheus `le` semantics).
    #[must_use]
    pub fn bucket_counts(&self) -> &[u64] {
        &self.bucket_counts
    }

    /// Sum of all recorded values in seconds.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Number of recorded values.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Non-cumulative count per bucket, followed by the `+Inf` bucket.
    ///
    /// This is the layout OTLP expects: `bounds.len() + 1` entries that sum
    /// to `count`.
    #[must_use]
    pub fn explicit_bucket_counts(&self) -> Vec<u64> {
        let mut counts = Vec::with_capacity(self.bucket_counts.len() + 1);
        let mut previous = 0u64;
        for &cumulative in &self.bucket_counts {
            counts.push(cumulative.saturating_sub(previous));
            previous = cumulative;
        }
        counts.push(self.count.saturating_sub(previous));
        counts
    }

    /// Aggregate accumulated since `baseline` was taken.
    ///
    /// `baseline` must be an earlier snapshot of the same series. Counters
    /// saturate at zero.
    #[must_use]
    pub fn delta_since(&self, baseline: &AggregateState) -> AggregateState {
        let bucket_counts = self
            .bucket_counts
            .iter()
            .zip(baseline.bucket_counts.iter().chain(std::iter::repeat(&0)))
            .map(|(current, base)| current.saturating_sub(*base))
            .collect();

        AggregateState {
            bucket_counts,
            sum: self.sum - baseline.sum,
            count: self.count.saturating_sub(baseline.count),
        }
    }
}

/// Thread-safe histogram accumulator keyed by [`LabelSet`].
#[derive(Debug)]
pub struct LatencyRecorder {
    buckets: HistogramBuckets,
    series: RwLock<HashMap<LabelSet, Arc<Mutex<AggregateState>>>>,
}

impl LatencyRecorder {
    /// Create an empty recorder with fixed bucket bounds.
    #[must_use]
    pub fn new(buckets: HistogramBuckets) -> Self {
        Self {
            buckets,
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Bucket bounds shared by every series in this recorder.
    #[must_use]
    pub fn buckets(&self) -> &HistogramBuckets {
        &self.buckets
    }

    /// Record one measurement.
    pub fn record(&self, measurement: Measurement) {
        let first_bucket = self.buckets.first_bucket(measurement.value);
        let series = self.series_for(&measurement.labels);
        series.lock().observe(first_bucket, measurement.value);
    }

    fn series_for(&self, labels: &LabelSet) -> Arc<Mutex<AggregateState>> {
        if let Some(series) = self.series.read().get(labels) {
            return Arc::clone(series);
        }

        let mut all = self.series.write();
        let series = all.entry(labels.clone()).or_insert_with(|| {
            Arc::new(Mutex::new(AggregateState::new(self.buckets.len())))
        });
        Arc::clone(series)
    }

    /// Point-in-time copy of every series, sorted by label set.
    ///
    /// Each series is copied under its own lock, so bucket counts, sum and
    /// count of one label set are always mutually consistent.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(LabelSet, AggregateState)> {
        let mut snapshot: Vec<(LabelSet, AggregateState)> = self
            .series
            .read()
            .iter()
            .map(|(labels, state)| (labels.clone(), state.lock().clone()))
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot
    }

    /// Number of distinct label sets seen so far.
    #[must_use]
    pub fn series_count(&self) -> usize {
        self.series.read().len()
    }
}

impl Default for LatencyRecorder {
    fn default() -> Self {
        Self::new(HistogramBuckets::default())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp
)]
mod tests {
    use super::*;

    fn get_200() -> LabelSet {
        LabelSet::new("GET", "200")
    }

    fn state_for(recorder: &LatencyRecorder, labels: &LabelSet) -> AggregateState {
        recorder
            .snapshot()
            .into_iter()
            .find(|(l, _)| l == labels)
            .map(|(_, s)| s)
            .expect("series should exist")
    }

    #[test]
    fn test_scenario_three_measurements() {
        let recorder = LatencyRecorder::default();
        for v in [0.02, 0.07, 0.3] {
            recorder.record(Measurement::new(v, get_200()));
        }

        let state = state_for(&recorder, &get_200());
        assert_eq!(state.bucket_counts(), &[1, 2, 3, 3, 3, 3]);
        assert_eq!(state.count(), 3);
        assert!((state.sum() - 0.39).abs() < 1e-9);
    }

    #[test]
    fn test_bucket_monotonicity() {
        let buckets = HistogramBuckets::default();
        for v in [0.0, 0.01, 0.05, 0.051, 0.1, 0.24, 0.5, 0.99, 1.0, 1.5, 2.0, 7.0] {
            let recorder = LatencyRecorder::new(buckets.clone());
            recorder.record(Measurement::new(v, get_200()));
            let state = state_for(&recorder, &get_200());

            for (bound, count) in buckets.bounds().iter().zip(state.bucket_counts()) {
                let expected = u64::from(*bound >= v);
                assert_eq!(*count, expected, "value {v} against bound {bound}");
            }
            assert_eq!(state.count(), 1);
        }
    }

    #[test]
    fn test_value_on_boundary_lands_in_that_bucket() {
        let recorder = LatencyRecorder::default();
        recorder.record(Measurement::new(0.25, get_200()));

        let state = state_for(&recorder, &get_200());
        assert_eq!(state.bucket_counts(), &[0, 0, 1, 1, 1, 1]);
    }

    #[test]
    fn test_value_above_largest_bound_only_counts_in_inf() {
        let recorder = LatencyRecorder::default();
        recorder.record(Measurement::new(5.0, get_200()));

        let state = state_for(&recorder, &get_200());
        assert_eq!(state.bucket_counts(), &[0, 0, 0, 0, 0, 0]);
        assert_eq!(state.count(), 1);
        assert_eq!(state.sum(), 5.0);
        assert_eq!(state.explicit_bucket_counts(), vec![0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_count_and_sum_consistency() {
        let recorder = LatencyRecorder::default();
        let values: Vec<f64> = (1..=50).map(|i| f64::from(i) * 0.013).collect();
        for v in &values {
            recorder.record(Measurement::new(*v, get_200()));
        }

        let state = state_for(&recorder, &get_200());
        assert_eq!(state.count(), 50);
        assert!((state.sum() - values.iter().sum::<f64>()).abs() < 1e-9);
    }

    #[test]
    fn test_label_isolation() {
        let recorder = LatencyRecorder::default();
        let not_found = LabelSet::new("GET", "404");

        recorder.record(Measurement::new(0.02, get_200()));
        let before = state_for(&recorder, &get_200());

        recorder.record(Measurement::new(1.5, not_found.clone()));
        recorder.record(Measurement::new(0.3, not_found.clone()));

        assert_eq!(state_for(&recorder, &get_200()), before);
        assert_eq!(state_for(&recorder, &not_found).count(), 2);
        assert_eq!(recorder.series_count(), 2);
    }

    #[test]
    fn test_concurrent_records_lose_no_updates() {
        let recorder = Arc::new(LatencyRecorder::default());
        let threads = 8;
        let per_thread = 2_000;

        std::thread::scope(|scope| {
            for t in 0..threads {
                let recorder = Arc::clone(&recorder);
                scope.spawn(move || {
                    for i in 0..per_thread {
                        // Mix in a second label set so inserts race with updates
                        let labels = if i % 10 == 0 {
                            LabelSet::new("POST", format!("{}", 200 + t))
                        } else {
                            get_200()
                        };
                        recorder.record(Measurement::new(0.01, labels));
                    }
                });
            }
        });

        let total: u64 = recorder.snapshot().iter().map(|(_, s)| s.count()).sum();
        assert_eq!(total, threads * per_thread);
        assert_eq!(state_for(&recorder, &get_200()).count(), threads * 1_800);
    }

    #[test]
    fn test_snapshot_is_sorted_and_detached() {
        let recorder = LatencyRecorder::default();
        recorder.record(Measurement::new(0.1, LabelSet::new("POST", "500")));
        recorder.record(Measurement::new(0.1, LabelSet::new("GET", "404")));
        recorder.record(Measurement::new(0.1, get_200()));

        let snapshot = recorder.snapshot();
        let labels: Vec<_> = snapshot.iter().map(|(l, _)| l.clone()).collect();
        assert_eq!(
            labels,
            vec![
                get_200(),
                LabelSet::new("GET", "404"),
                LabelSet::new("POST", "500")
            ]
        );

        recorder.record(Measurement::new(0.1, get_200()));
        assert_eq!(snapshot[0].1.count(), 1, "snapshot must not observe later writes");
    }

    #[test]
    fn test_measurement_clamps_invalid_values() {
        assert_eq!(Measurement::new(-1.0, get_200()).value(), 0.0);
        assert_eq!(Measurement::new(f64::NAN, get_200()).value(), 0.0);
        assert_eq!(Measurement::new(f64::INFINITY, get_200()).value(), 0.0);
        assert_eq!(
            Measurement::from_duration(Duration::from_millis(250), get_200()).value(),
            0.25
        );
    }

    #[test]
    fn test_bucket_validation() {
        assert_eq!(HistogramBuckets::new(vec![]), Err(BucketError::Empty));
        assert_eq!(
            HistogramBuckets::new(vec![0.1, f64::INFINITY]),
            Err(BucketError::NonFinite(f64::INFINITY))
        );
        assert_eq!(
            HistogramBuckets::new(vec![0.0, 1.0]),
            Err(BucketError::NonPositive(0.0))
        );
        assert_eq!(
            HistogramBuckets::new(vec![0.5, 0.5]),
            Err(BucketError::NotIncreasing {
                previous: 0.5,
                next: 0.5
            })
        );
        let buckets = HistogramBuckets::new(vec![0.1, 1.0]).unwrap();
        assert_eq!(buckets.bounds(), &[0.1, 1.0]);
        assert_eq!(HistogramBuckets::default().bounds(), DEFAULT_BUCKETS);
    }

    #[test]
    fn test_delta_since_baseline() {
        let recorder = LatencyRecorder::default();
        recorder.record(Measurement::new(0.1, get_200()));
        let baseline = state_for(&recorder, &get_200());

        recorder.record(Measurement::new(0.2, get_200()));
        recorder.record(Measurement::new(3.0, get_200()));
        let current = state_for(&recorder, &get_200());

        let delta = current.delta_since(&baseline);
        assert_eq!(delta.count(), 2);
        assert!((delta.sum() - 3.2).abs() < 1e-9);
        assert_eq!(delta.bucket_counts(), &[0, 0, 1, 1, 1, 1]);
    }

    #[test]
    fn test_delta_against_empty_baseline_is_identity() {
        let recorder = LatencyRecorder::default();
        recorder.record(Measurement::new(0.07, get_200()));
        let current = state_for(&recorder, &get_200());

        let delta = current.delta_since(&AggregateState::new(6));
        assert_eq!(delta, current);
    }
}
