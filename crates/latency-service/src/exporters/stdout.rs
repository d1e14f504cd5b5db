//! Local sink exporter for debugging.
//!
//! Writes one pretty-printed JSON document per export tick. Writes go to
//! stdout unless another writer is supplied.

use super::{ExportBatch, Exporter, PushExporter, Temporality, METRIC_DESCRIPTION, METRIC_NAME};
use crate::errors::ExportError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct StdoutDocument<'a> {
    metric: &'static str,
    description: &'static str,
    #[serde(flatten)]
    batch: &'a ExportBatch,
}

/// Push exporter writing JSON documents to a local writer.
pub struct StdoutExporter {
    writer: Mutex<Box<dyn Write + Send>>,
    temporality: Temporality,
}

impl StdoutExporter {
    /// Exporter writing to the process stdout.
    #[must_use]
    pub fn new(temporality: Temporality) -> Self {
        Self::with_writer(std::io::stdout(), temporality)
    }

    /// Exporter writing to an arbitrary writer.
    pub fn with_writer(writer: impl Write + Send + 'static, temporality: Temporality) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            temporality,
        }
    }
}

impl Exporter for StdoutExporter {
    fn describe(&self) -> &str {
        "stdout"
    }
}

#[async_trait]
impl PushExporter for StdoutExporter {
    fn temporality(&self) -> Temporality {
        self.temporality
    }

    async fn push(&self, batch: &ExportBatch) -> Result<(), ExportError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut document = serde_json::to_vec_pretty(&StdoutDocument {
            metric: METRIC_NAME,
            description: METRIC_DESCRIPTION,
            batch,
        })?;
        document.push(b'\n');

        let mut writer = self.writer.lock();
        writer.write_all(&document)?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), ExportError> {
        self.writer.lock().flush()?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::exporters::SeriesPoint;
    use crate::recorder::{LabelSet, LatencyRecorder, Measurement};
    use chrono::Utc;
    use std::io;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"))
        }
    }

    fn batch(values: &[f64]) -> ExportBatch {
        let recorder = LatencyRecorder::default();
        for v in values {
            recorder.record(Measurement::new(*v, LabelSet::new("GET", "200")));
        }
        ExportBatch {
            temporality: Temporality::Cumulative,
            start_time: Utc::now(),
            end_time: Utc::now(),
            bounds: recorder.buckets().bounds().to_vec(),
            series: recorder
                .snapshot()
                .into_iter()
                .map(|(labels, state)| SeriesPoint { labels, state })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_push_writes_one_json_document() {
        let buffer = SharedBuffer::default();
        let exporter = StdoutExporter::with_writer(buffer.clone(), Temporality::Cumulative);

        exporter.push(&batch(&[0.02, 0.07, 0.3])).await.unwrap();

        let output = String::from_utf8(buffer.0.lock().clone()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(json["metric"], "http_durations_histogram_seconds");
        assert_eq!(json["temporality"], "cumulative");
        assert_eq!(json["series"][0]["labels"]["method"], "GET");
        assert_eq!(json["series"][0]["state"]["count"], 3);
        assert_eq!(
            json["series"][0]["state"]["bucket_counts"],
            serde_json::json!([1, 2, 3, 3, 3, 3])
        );
    }

    #[tokio::test]
    async fn test_push_skips_empty_batch() {
        let buffer = SharedBuffer::default();
        let exporter = StdoutExporter::with_writer(buffer.clone(), Temporality::Delta);

        exporter.push(&batch(&[])).await.unwrap();
        assert!(buffer.0.lock().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_is_export_error() {
        let exporter = StdoutExporter::with_writer(BrokenPipe, Temporality::Cumulative);

        let result = exporter.push(&batch(&[0.1])).await;
        assert!(matches!(result, Err(ExportError::Io(msg)) if msg.contains("stdout closed")));

        let result = exporter.flush().await;
        assert!(matches!(result, Err(ExportError::Io(_))));
    }

    #[test]
    fn test_describe_and_temporality() {
        let exporter = StdoutExporter::new(Temporality::Delta);
        assert_eq!(exporter.describe(), "stdout");
        assert_eq!(exporter.temporality(), Temporality::Delta);
    }
}
