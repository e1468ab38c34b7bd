use crate::engine::{CleanedRecord, FittingEngine};
use crate::error::{ConfigError, FitError, SampleError};
use crate::params::CleaningParams;
use crate::reporter::{DirtySegmentReporter, PublisherHandle};
use crate::sample::{Reading, Sample};
use crate::stats::CleaningStats;
use crate::window::WindowBuffer;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Receives every cleaned record, in arrival order, as soon as its window
/// has been fitted.
pub trait RecordSink {
    fn emit(&mut self, record: CleanedRecord);
}

impl<F> RecordSink for F
where
    F: FnMut(CleanedRecord),
{
    fn emit(&mut self, record: CleanedRecord) {
        self(record)
    }
}

/// All state for one cleaned sensor stream. Not meant for concurrent
/// callers: `append` takes `&mut self`.
///
/// A constructed pipeline is always ready for the next sample. Fitting a full
/// window and emitting its records happens inside one `append` call, under a
/// `fitting` tracing span; invalid parameters never produce a pipeline.
#[derive(Debug)]
pub struct CleaningPipeline {
    params: CleaningParams,
    buffer: WindowBuffer,
    engine: FittingEngine,
    reporter: Option<DirtySegmentReporter>,
    stats: Arc<CleaningStats>,
}

impl CleaningPipeline {
    pub fn new(
        params: CleaningParams,
        publisher: Option<PublisherHandle>,
        stats: Arc<CleaningStats>,
    ) -> Self {
        let reporter = match (params.metadata.clone(), publisher) {
            (Some(target), Some(publisher)) => Some(DirtySegmentReporter::new(
                target,
                publisher,
                stats.clone(),
            )),
            (Some(_), None) => {
                tracing::warn!(
                    "metadata target configured without a publisher; publication disabled"
                );
                None
            }
            (None, _) => None,
        };
        tracing::info!(
            model = %params.model,
            window_size = params.window_size,
            error_bound = params.error_bound,
            publish = reporter.is_some(),
            "data cleaning pipeline ready"
        );

        Self {
            buffer: WindowBuffer::new(params.window_size),
            engine: FittingEngine::new(params.model, params.error_bound, params.window_size),
            reporter,
            stats,
            params,
        }
    }

    /// Validates `raw` and builds the pipeline. An error here is terminal for
    /// the sensor instance.
    pub fn from_params(
        raw: &BTreeMap<String, String>,
        publisher: Option<PublisherHandle>,
        stats: Arc<CleaningStats>,
    ) -> Result<Self, ConfigError> {
        let params = CleaningParams::from_params(raw)?;
        Ok(Self::new(params, publisher, stats))
    }

    pub fn params(&self) -> &CleaningParams {
        &self.params
    }

    pub fn stats(&self) -> Arc<CleaningStats> {
        self.stats.clone()
    }

    pub fn publishes_metadata(&self) -> bool {
        self.reporter.is_some()
    }

    /// Samples buffered toward the next window.
    pub fn pending(&self) -> usize {
        self.buffer.pending()
    }

    /// Entry point for producers that may deliver absent or non-finite
    /// values. Those are dropped before reaching the window; returns
    /// `Ok(false)` in that case.
    pub fn ingest<S: RecordSink>(
        &mut self,
        reading: Reading,
        sink: &mut S,
    ) -> Result<bool, FitError> {
        match Sample::from_reading(reading) {
            Ok(sample) => {
                self.append(sample, sink)?;
                Ok(true)
            }
            Err(err) => {
                self.drop_sample(&err);
                Ok(false)
            }
        }
    }

    fn drop_sample(&self, err: &SampleError) {
        CleaningStats::bump(&self.stats.samples_dropped);
        tracing::debug!(error = %err, "sample dropped");
    }

    /// Buffers one sample. When it completes a window, the window is fitted
    /// and every record is handed to `sink` before this returns. Returns the
    /// number of records emitted.
    pub fn append<S: RecordSink>(
        &mut self,
        sample: Sample,
        sink: &mut S,
    ) -> Result<usize, FitError> {
        if !sample.value.is_finite() {
            self.drop_sample(&SampleError::NonFinite {
                timestamp: sample.timestamp,
            });
            return Ok(0);
        }
        CleaningStats::bump(&self.stats.samples_accepted);

        let Some(window) = self.buffer.append(sample) else {
            return Ok(0);
        };

        let span = tracing::debug_span!("fitting", model = %self.params.model, len = window.len());
        let _entered = span.enter();
        let fitted = match self.engine.process(&window) {
            Ok(fitted) => fitted,
            Err(err) => {
                CleaningStats::bump(&self.stats.fit_failures);
                self.stats.record_error(err.to_string());
                tracing::error!(error = %err, model = %self.params.model, "window fit failed");
                return Err(err);
            }
        };
        CleaningStats::bump(&self.stats.windows_fitted);

        let mut emitted = 0;
        for record in fitted.records() {
            sink.emit(record);
            emitted += 1;
            if record.is_dirty() {
                CleaningStats::bump(&self.stats.dirty_points);
                if let Some(reporter) = &self.reporter {
                    reporter.report(&record);
                }
            }
        }
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn pipeline(window_size: &str) -> CleaningPipeline {
        CleaningPipeline::from_params(
            &params(&[
                ("model", "constant"),
                ("window_size", window_size),
                ("error_bound", "1.0"),
            ]),
            None,
            Arc::new(CleaningStats::new()),
        )
        .expect("valid")
    }

    #[test]
    fn emits_exactly_one_window_per_window_size_appends() {
        let mut pipeline = pipeline("4");
        let mut out = Vec::new();
        let mut sink = |record: CleanedRecord| out.push(record);

        let mut emitted = Vec::new();
        for i in 0..8 {
            emitted.push(pipeline.append(Sample::new(i, 1.0).unwrap(), &mut sink).unwrap());
        }
        assert_eq!(emitted, vec![0, 0, 0, 4, 0, 0, 0, 4]);
        assert_eq!(pipeline.pending(), 0);

        let stamps: Vec<i64> = out.iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps, (0..8).collect::<Vec<_>>());
        assert_eq!(pipeline.stats().snapshot().windows_fitted, 2);
    }

    #[test]
    fn absent_values_never_enter_the_window() {
        let mut pipeline = pipeline("2");
        let mut count = 0;
        let mut sink = |_: CleanedRecord| count += 1;

        let accepted = pipeline
            .ingest(Reading { timestamp: 0, value: None }, &mut sink)
            .unwrap();
        assert!(!accepted);
        pipeline
            .ingest(Reading { timestamp: 1, value: Some(f64::NAN) }, &mut sink)
            .unwrap();
        assert_eq!(pipeline.pending(), 0);

        pipeline
            .ingest(Reading { timestamp: 2, value: Some(1.0) }, &mut sink)
            .unwrap();
        pipeline
            .ingest(Reading { timestamp: 3, value: Some(1.0) }, &mut sink)
            .unwrap();
        assert_eq!(count, 2);

        let snapshot = pipeline.stats().snapshot();
        assert_eq!(snapshot.samples_dropped, 2);
        assert_eq!(snapshot.samples_accepted, 2);
    }

    #[test]
    fn zero_window_size_never_processes() {
        let mut pipeline = pipeline("0");
        let mut count = 0;
        let mut sink = |_: CleanedRecord| count += 1;
        for i in 0..50 {
            assert_eq!(pipeline.append(Sample::new(i, i as f64).unwrap(), &mut sink), Ok(0));
        }
        assert_eq!(count, 0);
        assert_eq!(pipeline.stats().snapshot().windows_fitted, 0);
    }

    #[test]
    fn metadata_without_publisher_disables_reporting() {
        let pipeline = CleaningPipeline::from_params(
            &params(&[
                ("model", "linear"),
                ("window_size", "3"),
                ("error_bound", "0.5"),
                ("metadata_server_url", "http://meta.example.com/"),
                ("operator", "ops"),
                ("deployment", "alps"),
                ("station", "st-1"),
                ("sensor", "temp"),
            ]),
            None,
            Arc::new(CleaningStats::new()),
        )
        .expect("valid");
        assert!(pipeline.params().publishes_metadata());
        assert!(!pipeline.publishes_metadata());
    }

    #[test]
    fn invalid_params_never_build_a_pipeline() {
        let err = CleaningPipeline::from_params(
            &params(&[("model", "linear"), ("window_size", "3")]),
            None,
            Arc::new(CleaningStats::new()),
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter { name: "error_bound" });

        let err = CleaningPipeline::from_params(
            &params(&[
                ("model", "linear"),
                ("window_size", "9223372036854775807"),
                ("error_bound", "0.5"),
            ]),
            None,
            Arc::new(CleaningStats::new()),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidParameter { name: "window_size", .. }
        ));
    }
}
