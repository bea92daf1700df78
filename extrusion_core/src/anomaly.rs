//! Per-record outlier detection over the monitored parameters.
//!
//! Each parameter is scored one of two ways:
//! - with at least `min_history` valid values in the window, the current
//!   value is appended to the historical sample and its z-score and MAD score
//!   are taken from that sample;
//! - otherwise a fixed or target-relative normal range is used and converted
//!   into pseudo scores.
//!
//! A record is anomalous when at least `outlier_quorum` parameters are
//! outliers.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::accessor::FieldPath;
use crate::config::{AnomalyCfg, PlausibilityCfg};
use crate::error::{AnalyticsError, Result};
use crate::history::HistoricalWindow;
use crate::reading::{AnnotatedReading, AnomalyAnnotation, DetectionMethod, ParameterScore, Reading};
use crate::stats;
use crate::types::NormalRange;

const DEFAULT_TARGET_THICKNESS: f64 = 25.0;
const DEFAULT_EXHAUST_SETPOINT: f64 = 30.0;

/// Effective outlier thresholds for one detection pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub z: f64,
    pub mad: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { z: 3.0, mad: 3.5 }
    }
}

impl From<&AnomalyCfg> for Thresholds {
    fn from(cfg: &AnomalyCfg) -> Self {
        Self {
            z: cfg.z_threshold,
            mad: cfg.mad_threshold,
        }
    }
}

/// Which cold-start range applies to a parameter. First match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColdStartRule {
    Pressure,
    Temperature,
    BlowerLoad,
    Throughput,
    Thickness,
    MaterialRatio,
    BlowerExhaust,
    HeatingZone,
    Relative,
}

impl ColdStartRule {
    pub fn classify(path: &str) -> Self {
        if path.contains("pressure") {
            Self::Pressure
        } else if path.contains("temperature") {
            Self::Temperature
        } else if path.contains("blower_load") {
            Self::BlowerLoad
        } else if path == "total_output" {
            Self::Throughput
        } else if path == "actual_thickness" {
            Self::Thickness
        } else if path.contains("actual_ratio") {
            Self::MaterialRatio
        } else if path.contains("blower_exhaust_actual") {
            Self::BlowerExhaust
        } else if path.contains("heating_zones") {
            Self::HeatingZone
        } else {
            Self::Relative
        }
    }

    /// Normal range for `value` of `path` within `reading`.
    pub fn range(self, path: &FieldPath, value: f64, reading: &Reading) -> NormalRange {
        match self {
            Self::Pressure => NormalRange::new(300.0, 600.0),
            Self::Temperature => NormalRange::new(180.0, 220.0),
            Self::BlowerLoad => NormalRange::new(0.0, 150.0),
            Self::Throughput => NormalRange::new(310.0, 330.0),
            Self::Thickness => {
                let target = target_or(reading, &FieldPath::key("target_thickness"), DEFAULT_TARGET_THICKNESS);
                NormalRange::around(target, 2.0)
            }
            Self::MaterialRatio => {
                let target = path
                    .sibling("actual_ratio", "target_ratio")
                    .map_or(0.0, |p| target_or(reading, &p, 0.0));
                NormalRange::around(target, 0.5)
            }
            Self::BlowerExhaust => {
                let sp = target_or(
                    reading,
                    &FieldPath::key("blower_exhaust_setpoint"),
                    DEFAULT_EXHAUST_SETPOINT,
                );
                NormalRange::around(sp, 10.0)
            }
            Self::HeatingZone => {
                let sp = path
                    .sibling("actual", "setpoint")
                    .map_or(0.0, |p| target_or(reading, &p, 0.0));
                NormalRange::around(sp, 30.0)
            }
            Self::Relative => {
                let (a, b) = (value * 0.7, value * 1.3);
                NormalRange::new(a.min(b), a.max(b))
            }
        }
    }
}

/// A target or setpoint of zero counts as absent.
fn target_or(reading: &Reading, path: &FieldPath, default: f64) -> f64 {
    reading
        .number(path)
        .filter(|v| *v != 0.0)
        .unwrap_or(default)
}

/// Pseudo z-score: distance from the midpoint in units of width / 6.
pub fn pseudo_z(value: f64, range: NormalRange) -> f64 {
    let width = range.width();
    if width == 0.0 {
        return 0.0;
    }
    (value - range.midpoint()).abs() / (width / 6.0)
}

/// Pseudo MAD score: excess beyond a bound over half that bound's distance
/// from zero. A zero denominator is replaced by 1. Never negative.
pub fn pseudo_mad(value: f64, range: NormalRange) -> f64 {
    let half_or_one = |b: f64| {
        let d = b.abs() * 0.5;
        if d == 0.0 { 1.0 } else { d }
    };
    if value < range.min {
        (range.min - value) / half_or_one(range.min)
    } else if value > range.max {
        (value - range.max) / half_or_one(range.max)
    } else {
        0.0
    }
}

#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    cfg: AnomalyCfg,
    gate: PlausibilityCfg,
    parameters: Vec<FieldPath>,
    reference: FieldPath,
}

impl AnomalyDetector {
    /// Parses the configured parameter paths up front; a malformed path is a
    /// configuration error.
    pub fn new(cfg: AnomalyCfg, gate: PlausibilityCfg) -> Result<Self> {
        let parse = |s: &str| {
            s.parse::<FieldPath>()
                .map_err(|e| AnalyticsError::Config(e.to_string()))
        };
        let parameters = cfg
            .parameters
            .iter()
            .map(|p| parse(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let reference = parse(&cfg.reference_parameter)?;
        Ok(Self {
            cfg,
            gate,
            parameters,
            reference,
        })
    }

    pub fn parameters(&self) -> &[FieldPath] {
        &self.parameters
    }

    pub fn config(&self) -> &AnomalyCfg {
        &self.cfg
    }

    /// Score every parameter of `reading` and reach a record-level verdict.
    pub fn detect(
        &self,
        reading: &Reading,
        parameters: &[FieldPath],
        window: &HistoricalWindow,
        thresholds: Thresholds,
    ) -> Result<AnomalyAnnotation> {
        if reading.fields.is_empty() {
            return Ok(AnomalyAnnotation::neutral());
        }

        let mut details = BTreeMap::new();
        let mut max_z = 0.0_f64;
        let mut max_mad = 0.0_f64;

        for path in parameters {
            let Some(value) = reading.number(path) else {
                continue;
            };
            let history = window.values(path);
            let score = if history.len() < self.cfg.min_history {
                let range = ColdStartRule::classify(path.as_str()).range(path, value, reading);
                let z = pseudo_z(value, range);
                let mad = pseudo_mad(value, range);
                if !z.is_finite() || !mad.is_finite() {
                    return Err(AnalyticsError::NumericFault {
                        parameter: path.to_string(),
                    }
                    .into());
                }
                ParameterScore {
                    value,
                    z_score: z,
                    mad_score: mad,
                    is_outlier: z > thresholds.z || mad > thresholds.mad,
                    normal_range: Some(range),
                }
            } else {
                let mut sample = history;
                sample.push(value);
                let z = stats::z_scores(&sample).last().copied().unwrap_or(0.0);
                let mad = stats::mad_scores(&sample).last().copied().unwrap_or(0.0);
                if !z.is_finite() || !mad.is_finite() {
                    return Err(AnalyticsError::NumericFault {
                        parameter: path.to_string(),
                    }
                    .into());
                }
                ParameterScore {
                    value,
                    z_score: z,
                    mad_score: mad,
                    is_outlier: z.abs() > thresholds.z || mad > thresholds.mad,
                    normal_range: None,
                }
            };
            max_z = max_z.max(score.z_score.abs());
            max_mad = max_mad.max(score.mad_score);
            details.insert(path.to_string(), score);
        }

        let outliers: BTreeSet<String> = details
            .iter()
            .filter(|(_, s)| s.is_outlier)
            .map(|(k, _)| k.clone())
            .collect();
        let z_norm = (max_z / (thresholds.z * 4.0)).min(1.0);
        let mad_norm = (max_mad / (thresholds.mad * 4.0)).min(1.0);

        Ok(AnomalyAnnotation {
            score: (z_norm + mad_norm) / 2.0,
            is_anomaly: outliers.len() >= self.cfg.outlier_quorum,
            parameters: outliers,
            method: if max_z > max_mad {
                DetectionMethod::ZScore
            } else {
                DetectionMethod::Mad
            },
            details,
        })
    }

    /// Detect a raw JSON payload; anything but an object is malformed.
    pub fn detect_value(
        &self,
        value: &Value,
        window: &HistoricalWindow,
        thresholds: Thresholds,
    ) -> Result<AnomalyAnnotation> {
        let reading = Reading::try_from_value(value.clone())?;
        self.detect(&reading, &self.parameters, window, thresholds)
    }

    /// Thresholds adapted to the spread of the reference parameter.
    ///
    /// With fewer than `adaptive_min_points` readings in the window, the
    /// static floors are returned unchanged.
    pub fn adaptive_thresholds(&self, window: &HistoricalWindow) -> Thresholds {
        let floor = Thresholds::from(&self.cfg);
        if window.len() < self.cfg.adaptive_min_points {
            return floor;
        }
        let sample = window.values(&self.reference);
        if sample.is_empty() {
            return floor;
        }
        let p = self.cfg.adaptive_percentile;
        let p_z = stats::percentile(&stats::z_scores(&sample), p);
        let p_mad = stats::percentile(&stats::mad_scores(&sample), p);
        let adapted = Thresholds {
            z: floor.z.max(p_z),
            mad: floor.mad.max(p_mad).min(self.cfg.mad_ceiling),
        };
        tracing::debug!(
            points = sample.len(),
            z = adapted.z,
            mad = adapted.mad,
            "adaptive thresholds"
        );
        adapted
    }

    /// Annotate one record. Already-annotated records pass through, gated
    /// records get the neutral annotation and faults are demoted to it.
    pub fn annotate(
        &self,
        mut record: AnnotatedReading,
        window: &HistoricalWindow,
        thresholds: Thresholds,
    ) -> AnnotatedReading {
        if record.anomaly.is_some() {
            return record;
        }
        if !self.gate.admits(&record.reading) {
            tracing::debug!(
                timestamp = ?record.reading.timestamp,
                "implausible throughput, skipping detection"
            );
            record.anomaly = Some(AnomalyAnnotation::neutral());
            return record;
        }
        let annotation = match self.detect(&record.reading, &self.parameters, window, thresholds) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(
                    timestamp = ?record.reading.timestamp,
                    error = %e,
                    "anomaly detection failed; record demoted to neutral"
                );
                AnomalyAnnotation::neutral()
            }
        };
        record.anomaly = Some(annotation);
        record
    }

    /// Annotate a batch against one window, with thresholds adapted to it.
    pub fn detect_batch(
        &self,
        records: Vec<AnnotatedReading>,
        window: &HistoricalWindow,
    ) -> Vec<AnnotatedReading> {
        let thresholds = self.adaptive_thresholds(window);
        records
            .into_iter()
            .map(|r| self.annotate(r, window, thresholds))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn detector() -> AnomalyDetector {
        AnomalyDetector::new(AnomalyCfg::default(), PlausibilityCfg::default()).unwrap()
    }

    #[test]
    fn classification_follows_rule_order() {
        use ColdStartRule::*;
        assert_eq!(ColdStartRule::classify("extruder_B_pressure"), Pressure);
        assert_eq!(ColdStartRule::classify("extruder_C_temperature"), Temperature);
        assert_eq!(ColdStartRule::classify("blower_load_2"), BlowerLoad);
        assert_eq!(ColdStartRule::classify("total_output"), Throughput);
        assert_eq!(ColdStartRule::classify("actual_thickness"), Thickness);
        assert_eq!(
            ColdStartRule::classify("materials.extruder_A[1].actual_ratio"),
            MaterialRatio
        );
        assert_eq!(ColdStartRule::classify("blower_exhaust_actual"), BlowerExhaust);
        assert_eq!(
            ColdStartRule::classify("heating_zones.extruder_A.zone_1.actual"),
            HeatingZone
        );
        assert_eq!(ColdStartRule::classify("winder_1_length"), Relative);
    }

    #[test]
    fn zero_target_falls_back_to_default() {
        let r = Reading::from_value(json!({ "target_thickness": 0, "actual_thickness": 25.0 }));
        let range = ColdStartRule::Thickness.range(&FieldPath::key("actual_thickness"), 25.0, &r);
        assert_eq!(range, NormalRange::new(23.0, 27.0));
        let r = Reading::from_value(json!({ "blower_exhaust_setpoint": 40 }));
        let range =
            ColdStartRule::BlowerExhaust.range(&FieldPath::key("blower_exhaust_actual"), 0.0, &r);
        assert_eq!(range, NormalRange::new(30.0, 50.0));
    }

    #[test]
    fn pseudo_scores() {
        let r = NormalRange::new(310.0, 330.0);
        assert_eq!(pseudo_z(320.0, r), 0.0);
        assert!((pseudo_z(330.0, r) - 3.0).abs() < 1e-12);
        assert_eq!(pseudo_mad(320.0, r), 0.0);
        assert!((pseudo_mad(495.0, r) - 165.0 / 165.0).abs() < 1e-12);
        assert!((pseudo_mad(155.0, r) - 1.0).abs() < 1e-12);
        // zero bound: denominator replaced by 1
        assert_eq!(pseudo_mad(-2.0, NormalRange::new(0.0, 150.0)), 2.0);
        assert_eq!(pseudo_z(5.0, NormalRange::new(5.0, 5.0)), 0.0);
    }

    #[rstest]
    #[case(-60.0, NormalRange::new(-40.0, 10.0), 1.0)]
    #[case(-5.0, NormalRange::new(-4.0, -2.0), 0.5)]
    #[case(20.0, NormalRange::new(-40.0, -10.0), 6.0)]
    fn pseudo_mad_is_positive_below_negative_bounds(
        #[case] value: f64,
        #[case] range: NormalRange,
        #[case] expected: f64,
    ) {
        let mad = pseudo_mad(value, range);
        assert!(mad > 0.0);
        assert!((mad - expected).abs() < 1e-12);
    }

    #[test]
    fn relative_range_is_ordered_for_negative_values() {
        let r = Reading::default();
        let range = ColdStartRule::Relative.range(&FieldPath::key("offset"), -40.0, &r);
        assert!(range.min < range.max);
        assert!(range.contains(-40.0));
        assert_eq!(pseudo_mad(-40.0, range), 0.0);
    }

    #[test]
    fn empty_reading_is_neutral() {
        let d = detector();
        let a = d
            .detect(&Reading::default(), d.parameters(), &HistoricalWindow::empty(), Thresholds::default())
            .unwrap();
        assert_eq!(a, AnomalyAnnotation::neutral());
    }

    #[test]
    fn non_object_payload_is_malformed() {
        let d = detector();
        let err = d
            .detect_value(&json!(42), &HistoricalWindow::empty(), Thresholds::default())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalyticsError>(),
            Some(AnalyticsError::MalformedReading(_))
        ));
    }

    #[test]
    fn bad_parameter_path_is_config_error() {
        let cfg = AnomalyCfg {
            parameters: vec!["materials.extruder_A[".into()],
            ..AnomalyCfg::default()
        };
        assert!(AnomalyDetector::new(cfg, PlausibilityCfg::default()).is_err());
    }
}
