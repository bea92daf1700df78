//! Configuration types for the analytics engine.
//!
//! These are the runtime configuration structs used by the detector, scorer,
//! predictor and runner. They are separate from the TOML-deserialized config
//! in `extrusion_config`; see `conversions` for the mapping.

use std::collections::BTreeMap;

use crate::accessor::FieldPath;
use crate::types::Tolerance;

/// Field holding line throughput in every reading.
pub const THROUGHPUT_FIELD: &str = "total_output";

/// The 35 parameters monitored for anomalies by default.
pub fn default_anomaly_parameters() -> Vec<String> {
    let mut out: Vec<String> = vec![THROUGHPUT_FIELD.to_string()];
    for x in ["A", "B", "C"] {
        out.push(format!("extruder_{x}_pressure"));
    }
    for x in ["A", "B", "C"] {
        out.push(format!("extruder_{x}_temperature"));
    }
    out.extend(
        ["blower_load_1", "blower_load_2", "blower_exhaust_actual", "actual_thickness"]
            .map(String::from),
    );
    for x in ["A", "B", "C"] {
        for zone in [1, 3, 5, 7] {
            out.push(format!("heating_zones.extruder_{x}.zone_{zone}.actual"));
        }
    }
    out.extend(material_ratio_parameters());
    out
}

/// `materials.extruder_X[i].actual_ratio` for three extruders, four components each.
pub fn material_ratio_parameters() -> Vec<String> {
    let mut out = Vec::with_capacity(12);
    for x in ["A", "B", "C"] {
        for i in 0..4 {
            out.push(format!("materials.extruder_{x}[{i}].actual_ratio"));
        }
    }
    out
}

/// Anomaly detection thresholds and regime switches.
#[derive(Debug, Clone)]
pub struct AnomalyCfg {
    /// Static z-score floor.
    pub z_threshold: f64,
    /// Static MAD-score floor.
    pub mad_threshold: f64,
    /// Minimum valid historical values before sample statistics are trusted.
    pub min_history: usize,
    /// Number of outlier parameters that make a record anomalous.
    pub outlier_quorum: usize,
    /// Window size from which adaptive thresholds kick in.
    pub adaptive_min_points: usize,
    /// Percentile (0..=100) of reference-parameter scores used for adaptation.
    pub adaptive_percentile: f64,
    /// Upper bound on the adapted MAD threshold.
    pub mad_ceiling: f64,
    /// Parameter whose historical distribution drives threshold adaptation.
    pub reference_parameter: String,
    /// Monitored parameters (dotted/indexed paths).
    pub parameters: Vec<String>,
}

impl Default for AnomalyCfg {
    fn default() -> Self {
        Self {
            z_threshold: 3.0,
            mad_threshold: 3.5,
            min_history: 10,
            outlier_quorum: 3,
            adaptive_min_points: 20,
            adaptive_percentile: 95.0,
            mad_ceiling: 10.0,
            reference_parameter: THROUGHPUT_FIELD.to_string(),
            parameters: default_anomaly_parameters(),
        }
    }
}

/// Corrupt-row guard applied before detection, scoring and history admission.
#[derive(Debug, Clone)]
pub struct PlausibilityCfg {
    pub throughput_field: FieldPath,
    /// Inclusive upper bound; the lower bound is exclusive at 0.
    pub throughput_max: f64,
}

impl Default for PlausibilityCfg {
    fn default() -> Self {
        Self {
            throughput_field: FieldPath::key(THROUGHPUT_FIELD),
            throughput_max: 1000.0,
        }
    }
}

/// Per-parameter tolerance overrides, keyed by the `actual` path.
pub type Tolerances = BTreeMap<String, Tolerance>;

#[derive(Debug, Clone, Default)]
pub struct QualityCfg {
    /// Overrides layered over the built-in tolerances.
    pub tolerances: Tolerances,
}

/// Historical window and in-flight buffer sizing.
#[derive(Debug, Clone)]
pub struct HistoryCfg {
    /// Maximum readings kept in the comparison window.
    pub capacity: usize,
    /// How many records to request from the store per batch.
    pub fetch_limit: usize,
    /// Newest records retained from earlier batches of the same run.
    pub in_flight_capacity: usize,
}

impl Default for HistoryCfg {
    fn default() -> Self {
        Self {
            capacity: 100,
            fetch_limit: 50,
            in_flight_capacity: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MaintenanceCfg {
    /// Days until maintenance predicted for a perfectly healthy unit.
    pub horizon_days: u32,
}

impl Default for MaintenanceCfg {
    fn default() -> Self {
        Self { horizon_days: 180 }
    }
}

#[derive(Debug, Clone)]
pub struct RunnerCfg {
    /// Worker threads for per-record evaluation (1 = sequential).
    pub workers: usize,
    /// Persist annotated records through the store after each batch.
    pub persist: bool,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self {
            workers: 1,
            persist: false,
        }
    }
}

/// Everything the engine needs, in one place.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub anomaly: AnomalyCfg,
    pub plausibility: PlausibilityCfg,
    pub quality: QualityCfg,
    pub history: HistoryCfg,
    pub maintenance: MaintenanceCfg,
    pub runner: RunnerCfg,
}
