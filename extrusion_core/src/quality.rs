//! Quality scoring: deviation from target plus process capability.
//!
//! The final score is the sum of two 0..=50 contributions, rounded:
//! the mean per-parameter deviation score scaled to 50, and the mean of the
//! Cpk-derived scores for thickness and throughput.

use std::collections::BTreeMap;

use crate::accessor::FieldPath;
use crate::config::{PlausibilityCfg, QualityCfg, THROUGHPUT_FIELD, Tolerances, material_ratio_parameters};
use crate::error::{AnalyticsError, Result};
use crate::history::HistoricalWindow;
use crate::reading::{AnnotatedReading, Capability, DeviationDetail, ProcessCapability, QualityAnnotation, Reading};
use crate::stats;
use crate::types::Tolerance;

pub const THICKNESS_FIELD: &str = "actual_thickness";
pub const TARGET_THICKNESS_FIELD: &str = "target_thickness";
pub const TARGET_OUTPUT_FIELD: &str = "target_output";

/// Cpk mapped to a score of 0.
pub const CPK_INCAPABLE: f64 = 0.67;
/// Cpk mapped to the full 50.
pub const CPK_CAPABLE: f64 = 1.33;
/// Fewer capability samples than this yield Cp = Cpk = 0.
pub const MIN_CAPABILITY_POINTS: usize = 10;

/// Built-in tolerances for the scored parameters.
pub fn default_tolerances() -> Tolerances {
    let mut t = Tolerances::new();
    t.insert(THICKNESS_FIELD.to_string(), Tolerance::symmetric(0.5));
    t.insert(THROUGHPUT_FIELD.to_string(), Tolerance::symmetric(20.0));
    for p in material_ratio_parameters() {
        t.insert(p, Tolerance::symmetric(0.2));
    }
    t
}

/// 1 within half the tolerance width of target, decaying linearly to 0 over
/// the next half width. 0 for a degenerate tolerance.
pub fn deviation_score(actual: f64, target: f64, tolerance: Tolerance) -> f64 {
    if !actual.is_finite() || !target.is_finite() {
        return 0.0;
    }
    let width = tolerance.width();
    if width == 0.0 {
        return 0.0;
    }
    let half = width / 2.0;
    let deviation = (actual - target).abs();
    if deviation <= half {
        1.0
    } else {
        (1.0 - (deviation - half) / half).max(0.0)
    }
}

/// Cp and Cpk of `data` against `(lsl, usl)`, using the sample standard
/// deviation. Both are 0 for short samples, zero spread or inverted limits;
/// Cpk is floored at 0.
pub fn process_capability(data: &[f64], (lsl, usl): (f64, f64)) -> Capability {
    if data.len() < MIN_CAPABILITY_POINTS || usl <= lsl || !usl.is_finite() || !lsl.is_finite() {
        return Capability::default();
    }
    let sigma = stats::sample_std_dev(data);
    if sigma == 0.0 || !sigma.is_finite() {
        return Capability::default();
    }
    let mean = stats::mean(data);
    let cp = (usl - lsl) / (6.0 * sigma);
    let cpu = (usl - mean) / (3.0 * sigma);
    let cpl = (mean - lsl) / (3.0 * sigma);
    Capability {
        cp,
        cpk: cpu.min(cpl).max(0.0),
    }
}

/// Linear map of Cpk onto 0..=50 between 0.67 and 1.33.
pub fn cpk_to_score(cpk: f64) -> f64 {
    ((cpk - CPK_INCAPABLE) / (CPK_CAPABLE - CPK_INCAPABLE) * 50.0).clamp(0.0, 50.0)
}

/// `(actual, target)` path pairs that are scored for deviation.
fn scored_pairs() -> Vec<(String, String)> {
    let mut pairs = vec![
        (THICKNESS_FIELD.to_string(), TARGET_THICKNESS_FIELD.to_string()),
        (THROUGHPUT_FIELD.to_string(), TARGET_OUTPUT_FIELD.to_string()),
    ];
    pairs.extend(material_ratio_parameters().into_iter().map(|a| {
        let t = a.replacen("actual_ratio", "target_ratio", 1);
        (a, t)
    }));
    pairs
}

#[derive(Debug, Clone)]
pub struct QualityScorer {
    gate: PlausibilityCfg,
    tolerances: Tolerances,
    pairs: Vec<(FieldPath, FieldPath)>,
    thickness: FieldPath,
    target_thickness: FieldPath,
    target_output: FieldPath,
}

impl QualityScorer {
    pub fn new(cfg: &QualityCfg, gate: PlausibilityCfg) -> Result<Self> {
        let parse = |s: &str| {
            s.parse::<FieldPath>()
                .map_err(|e| AnalyticsError::Config(e.to_string()))
        };
        let mut pairs = Vec::new();
        for (a, t) in scored_pairs() {
            pairs.push((parse(&a)?, parse(&t)?));
        }
        let mut tolerances = default_tolerances();
        tolerances.extend(cfg.tolerances.iter().map(|(k, v)| (k.clone(), *v)));
        Ok(Self {
            gate,
            tolerances,
            pairs,
            thickness: FieldPath::key(THICKNESS_FIELD),
            target_thickness: FieldPath::key(TARGET_THICKNESS_FIELD),
            target_output: FieldPath::key(TARGET_OUTPUT_FIELD),
        })
    }

    /// Built-in tolerances merged with the configured overrides.
    pub fn tolerances(&self) -> &Tolerances {
        &self.tolerances
    }

    fn tolerance_for(&self, key: &str, overrides: &Tolerances) -> Option<Tolerance> {
        overrides
            .get(key)
            .or_else(|| self.tolerances.get(key))
            .copied()
    }

    /// Score one reading. `overrides` take precedence over every other
    /// tolerance for the keys they name.
    pub fn score(
        &self,
        reading: &Reading,
        overrides: &Tolerances,
        window: &HistoricalWindow,
    ) -> Result<QualityAnnotation> {
        let mut detail = BTreeMap::new();
        for (actual_path, target_path) in &self.pairs {
            let (Some(actual), Some(target)) = (reading.number(actual_path), reading.number(target_path))
            else {
                continue;
            };
            let Some(tol) = self.tolerance_for(actual_path.as_str(), overrides) else {
                continue;
            };
            detail.insert(
                actual_path.to_string(),
                DeviationDetail {
                    actual,
                    target,
                    score: deviation_score(actual, target, tol),
                },
            );
        }
        let deviation = if detail.is_empty() {
            0.0
        } else {
            detail.values().map(|d| d.score).sum::<f64>() / detail.len() as f64 * 50.0
        };

        let thickness = self.capability_of(
            reading,
            &self.thickness,
            &self.target_thickness,
            overrides,
            window.values(&self.thickness),
        );
        let throughput_data: Vec<f64> = window
            .values(&self.gate.throughput_field)
            .into_iter()
            .filter(|v| self.gate.admits_throughput(*v))
            .collect();
        let throughput = self.capability_of(
            reading,
            &self.gate.throughput_field,
            &self.target_output,
            overrides,
            throughput_data,
        );
        let capability = (cpk_to_score(thickness.cpk) + cpk_to_score(throughput.cpk)) / 2.0;

        let total = (deviation + capability).round();
        if !total.is_finite() {
            return Err(AnalyticsError::NumericFault {
                parameter: "quality_score".to_string(),
            }
            .into());
        }
        Ok(QualityAnnotation {
            score: total.clamp(0.0, 100.0) as u8,
            deviation_score: deviation,
            capability_score: capability,
            deviation_detail: detail,
            process_capability: ProcessCapability {
                thickness,
                throughput,
            },
        })
    }

    /// Missing targets yield zero capability.
    fn capability_of(
        &self,
        reading: &Reading,
        actual: &FieldPath,
        target: &FieldPath,
        overrides: &Tolerances,
        data: Vec<f64>,
    ) -> Capability {
        let (Some(target), Some(tol)) = (reading.number(target), self.tolerance_for(actual.as_str(), overrides))
        else {
            return Capability::default();
        };
        process_capability(&data, tol.limits_around(target))
    }

    /// Gated records get the zero annotation; faults are demoted to it.
    pub fn annotate(&self, mut record: AnnotatedReading, window: &HistoricalWindow) -> AnnotatedReading {
        if !self.gate.admits(&record.reading) {
            record.quality = Some(QualityAnnotation::zero());
            return record;
        }
        let annotation = match self.score(&record.reading, &Tolerances::new(), window) {
            Ok(q) => q,
            Err(e) => {
                tracing::warn!(
                    timestamp = ?record.reading.timestamp,
                    error = %e,
                    "quality scoring failed; record demoted to zero score"
                );
                QualityAnnotation::zero()
            }
        };
        record.quality = Some(annotation);
        record
    }

    pub fn score_batch(&self, records: Vec<AnnotatedReading>, window: &HistoricalWindow) -> Vec<AnnotatedReading> {
        records
            .into_iter()
            .map(|r| self.annotate(r, window))
            .collect()
    }
}
