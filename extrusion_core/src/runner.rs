//! Batch orchestration for one import run.
//!
//! For every batch the runner fetches recent history from the store, merges
//! it with the records already processed in this run, adapts the detection
//! thresholds, then annotates each record with an anomaly verdict and a
//! quality score. Processed records are remembered in the in-flight buffer
//! and optionally persisted.

use extrusion_traits::ReadingStore;
use serde_json::Value;

use crate::anomaly::{AnomalyDetector, Thresholds};
use crate::builder::{Missing, RunnerBuilder};
use crate::config::Settings;
use crate::error::{AnalyticsError, Result};
use crate::history::{HistoricalWindow, InFlightBuffer};
use crate::pool;
use crate::quality::QualityScorer;
use crate::reading::{AnnotatedReading, Reading};

/// Outcome of one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Annotated records, in input order.
    pub records: Vec<AnnotatedReading>,
    /// Records written back to the store.
    pub persisted: usize,
    /// Size of the comparison window the batch was scored against.
    pub window_len: usize,
    pub thresholds: Option<Thresholds>,
    /// Set when the write-back failed; the annotations are still returned.
    pub persist_error: Option<AnalyticsError>,
}

impl BatchReport {
    pub fn anomalies(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.anomaly.as_ref().is_some_and(|a| a.is_anomaly))
            .count()
    }

    /// Mean quality score over records that have one.
    pub fn mean_quality(&self) -> Option<f64> {
        let scores: Vec<f64> = self
            .records
            .iter()
            .filter_map(|r| r.quality.as_ref().map(|q| f64::from(q.score)))
            .collect();
        (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

pub struct AnalyticsRunner<S> {
    pub(crate) store: S,
    pub(crate) settings: Settings,
    pub(crate) detector: AnomalyDetector,
    pub(crate) scorer: QualityScorer,
    pub(crate) in_flight: InFlightBuffer,
}

impl<S> core::fmt::Debug for AnalyticsRunner<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AnalyticsRunner")
            .field("workers", &self.settings.runner.workers)
            .field("persist", &self.settings.runner.persist)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl<S: ReadingStore<AnnotatedReading>> AnalyticsRunner<S> {
    /// Start building a runner.
    pub fn builder() -> RunnerBuilder<S, Missing> {
        RunnerBuilder::default()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn detector(&self) -> &AnomalyDetector {
        &self.detector
    }

    pub fn scorer(&self) -> &QualityScorer {
        &self.scorer
    }

    pub fn in_flight(&self) -> &InFlightBuffer {
        &self.in_flight
    }

    /// Recent store history merged with this run's in-flight records.
    /// A failed fetch degrades to in-flight records only.
    pub fn assemble_window(&self) -> HistoricalWindow {
        let persisted = match self.store.fetch_recent(self.settings.history.fetch_limit) {
            Ok(v) => v,
            Err(e) => {
                let err = AnalyticsError::History(e.to_string());
                tracing::warn!(error = %err, "continuing with in-flight history only");
                Vec::new()
            }
        };
        let in_flight = self.in_flight.snapshot();
        HistoricalWindow::assemble(
            &persisted,
            &in_flight,
            self.settings.history.capacity,
            &self.settings.plausibility,
        )
    }

    /// Annotate a batch. Neither per-record failures nor a failed write-back
    /// abort it; the latter is carried in [`BatchReport::persist_error`].
    pub fn process_batch(&self, records: Vec<AnnotatedReading>) -> Result<BatchReport> {
        if records.is_empty() {
            return Ok(BatchReport::default());
        }
        let window = self.assemble_window();
        let thresholds = self.detector.adaptive_thresholds(&window);

        let detector = &self.detector;
        let scorer = &self.scorer;
        let window_ref = &window;
        let annotated = pool::map_ordered(records, self.settings.runner.workers, |rec| {
            scorer.annotate(detector.annotate(rec, window_ref, thresholds), window_ref)
        });

        self.in_flight.append(&annotated);

        let mut persisted = 0;
        let mut persist_error = None;
        if self.settings.runner.persist {
            let storable: Vec<AnnotatedReading> = annotated
                .iter()
                .filter(|r| r.reading.timestamp.is_some())
                .cloned()
                .collect();
            if !storable.is_empty() {
                match self.store.insert(&storable) {
                    Ok(n) => persisted = n,
                    Err(e) => {
                        let err = AnalyticsError::Persistence(e.to_string());
                        tracing::warn!(error = %err, records = storable.len(), "write-back failed; annotations kept");
                        persist_error = Some(err);
                    }
                }
            }
        }

        let report = BatchReport {
            records: annotated,
            persisted,
            window_len: window.len(),
            thresholds: Some(thresholds),
            persist_error,
        };
        tracing::info!(
            records = report.records.len(),
            anomalies = report.anomalies(),
            persisted,
            window = report.window_len,
            z = thresholds.z,
            mad = thresholds.mad,
            "batch processed"
        );
        Ok(report)
    }

    pub fn process_readings(&self, readings: Vec<Reading>) -> Result<BatchReport> {
        self.process_batch(readings.into_iter().map(AnnotatedReading::from).collect())
    }

    /// Annotate a JSON array of reading documents.
    ///
    /// Anything but an array is rejected; non-object elements become empty
    /// readings and receive the neutral annotations. Elements that already
    /// carry an anomaly annotation keep it.
    pub fn process_json(&self, batch: &Value) -> Result<BatchReport> {
        let Value::Array(items) = batch else {
            return Err(AnalyticsError::InvalidBatch("batch must be a JSON array".into()).into());
        };
        let records = items
            .iter()
            .map(|v| AnnotatedReading::from_value(v.clone()))
            .collect();
        self.process_batch(records)
    }
}
