//! Type-state builder for `AnalyticsRunner` and the plain `build_runner`
//! constructor.
//!
//! `build()` only becomes available once a reading store is provided.
//! `try_build()` is always available and reports the missing piece at runtime.

use std::marker::PhantomData;

use extrusion_traits::ReadingStore;

use crate::anomaly::AnomalyDetector;
use crate::config::{AnomalyCfg, HistoryCfg, PlausibilityCfg, QualityCfg, Settings};
use crate::error::{BuildError, Result};
use crate::history::InFlightBuffer;
use crate::quality::QualityScorer;
use crate::reading::AnnotatedReading;
use crate::runner::AnalyticsRunner;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `AnalyticsRunner`. Settings are validated on `build()`.
pub struct RunnerBuilder<St, S = Missing> {
    store: Option<St>,
    settings: Settings,
    _s: PhantomData<S>,
}

impl<St> Default for RunnerBuilder<St, Missing> {
    fn default() -> Self {
        Self {
            store: None,
            settings: Settings::default(),
            _s: PhantomData,
        }
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

/// Validate settings and construct the runner with its detector, scorer and
/// in-flight buffer.
///
/// Shared by `RunnerBuilder::try_build()` and `build_runner()`.
fn validate_and_build<St>(store: St, settings: Settings) -> Result<AnalyticsRunner<St>> {
    let a = &settings.anomaly;
    if !(a.z_threshold.is_finite() && a.z_threshold > 0.0) {
        return Err(invalid("z_threshold must be > 0"));
    }
    if !(a.mad_threshold.is_finite() && a.mad_threshold > 0.0) {
        return Err(invalid("mad_threshold must be > 0"));
    }
    if a.mad_ceiling < a.mad_threshold {
        return Err(invalid("mad_ceiling must be >= mad_threshold"));
    }
    if a.outlier_quorum == 0 {
        return Err(invalid("outlier_quorum must be >= 1"));
    }
    if !(a.adaptive_percentile > 0.0 && a.adaptive_percentile <= 100.0) {
        return Err(invalid("adaptive_percentile must be in (0, 100]"));
    }
    if a.parameters.is_empty() {
        return Err(invalid("at least one monitored parameter is required"));
    }
    if !(settings.plausibility.throughput_max.is_finite() && settings.plausibility.throughput_max > 0.0) {
        return Err(invalid("throughput_max must be > 0"));
    }
    if settings.history.capacity == 0 {
        return Err(invalid("history capacity must be >= 1"));
    }
    if settings.history.in_flight_capacity == 0 {
        return Err(invalid("in-flight capacity must be >= 1"));
    }
    if settings.runner.workers == 0 {
        return Err(invalid("workers must be >= 1"));
    }

    let detector = AnomalyDetector::new(settings.anomaly.clone(), settings.plausibility.clone())?;
    let scorer = QualityScorer::new(&settings.quality, settings.plausibility.clone())?;
    let in_flight = InFlightBuffer::new(settings.history.in_flight_capacity);

    tracing::debug!(
        parameters = detector.parameters().len(),
        tolerances = scorer.tolerances().len(),
        workers = settings.runner.workers,
        persist = settings.runner.persist,
        "analytics runner built"
    );

    Ok(AnalyticsRunner {
        store,
        settings,
        detector,
        scorer,
        in_flight,
    })
}

impl<St, S> RunnerBuilder<St, S>
where
    St: ReadingStore<AnnotatedReading>,
{
    /// Fallible build available in any type-state.
    pub fn try_build(self) -> Result<AnalyticsRunner<St>> {
        let store = self
            .store
            .ok_or_else(|| eyre::Report::new(BuildError::MissingStore))?;
        validate_and_build(store, self.settings)
    }
}

/// Chainable setters that do not affect type-state.
impl<St, S> RunnerBuilder<St, S> {
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }
    pub fn with_anomaly(mut self, anomaly: AnomalyCfg) -> Self {
        self.settings.anomaly = anomaly;
        self
    }
    pub fn with_quality(mut self, quality: QualityCfg) -> Self {
        self.settings.quality = quality;
        self
    }
    pub fn with_plausibility(mut self, plausibility: PlausibilityCfg) -> Self {
        self.settings.plausibility = plausibility;
        self
    }
    pub fn with_history(mut self, history: HistoryCfg) -> Self {
        self.settings.history = history;
        self
    }
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.settings.runner.workers = workers;
        self
    }
    /// Write annotated records back through the store after each batch.
    pub fn with_persist(mut self, persist: bool) -> Self {
        self.settings.runner.persist = persist;
        self
    }
}

// Setter that advances type-state
impl<St> RunnerBuilder<St, Missing> {
    pub fn with_store(self, store: St) -> RunnerBuilder<St, Set> {
        RunnerBuilder {
            store: Some(store),
            settings: self.settings,
            _s: PhantomData,
        }
    }
}

impl<St: ReadingStore<AnnotatedReading>> RunnerBuilder<St, Set> {
    /// Validate and build. Only available once a store is set.
    pub fn build(self) -> Result<AnalyticsRunner<St>> {
        self.try_build()
    }
}

/// Build a runner directly from a store and settings.
pub fn build_runner<St>(store: St, settings: Settings) -> Result<AnalyticsRunner<St>>
where
    St: ReadingStore<AnnotatedReading>,
{
    validate_and_build(store, settings)
}
