#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and line-export import for the analytics engine.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//!   Every section is optional; an empty file yields the defaults.
//! - `import` maps the line controller's CSV export onto the reading schema.
use std::collections::BTreeMap;

use serde::Deserialize;

pub mod import;
pub mod path;

pub use import::{ImportReport, import_line_csv, import_line_csv_reader};
pub use path::{PathSegment, parse_field_path};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AnomalyCfg {
    /// Static z-score floor; adaptive thresholds never go below it.
    pub z_threshold: f64,
    /// Static MAD-score floor.
    pub mad_threshold: f64,
    /// Valid historical values required before sample statistics are used
    pub min_history: usize,
    /// Outlier parameters needed to flag a record
    pub outlier_quorum: usize,
    pub adaptive_min_points: usize,
    /// Percentile in (0, 100]
    pub adaptive_percentile: f64,
    /// Upper bound for the adapted MAD threshold
    pub mad_ceiling: f64,
    pub reference_parameter: String,
    /// Monitored parameter paths. Absent means the built-in list.
    pub parameters: Option<Vec<String>>,
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
            reference_parameter: "total_output".to_string(),
            parameters: None,
        }
    }
}

/// Offsets from target, e.g. `{ min = -0.5, max = 0.5 }`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct ToleranceCfg {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct QualityCfg {
    /// Overrides keyed by the `actual` parameter path:
    ///
    /// ```toml
    /// [quality.tolerances]
    /// actual_thickness = { min = -0.3, max = 0.3 }
    /// "materials.extruder_A[0].actual_ratio" = { min = -0.1, max = 0.1 }
    /// ```
    pub tolerances: BTreeMap<String, ToleranceCfg>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PlausibilityCfg {
    /// Largest admissible throughput (inclusive)
    pub throughput_max: f64,
}

impl Default for PlausibilityCfg {
    fn default() -> Self {
        Self {
            throughput_max: 1000.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistoryCfg {
    pub capacity: usize,
    /// Records requested from the store per batch
    pub fetch_limit: usize,
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MaintenanceCfg {
    /// Days to maintenance for a unit with a perfect composite score
    pub horizon_days: u32,
}

impl Default for MaintenanceCfg {
    fn default() -> Self {
        Self { horizon_days: 180 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RunnerCfg {
    /// Worker threads for per-record evaluation; 1 runs inline
    pub workers: usize,
    /// Write annotated records back to the store
    pub persist: bool,
    /// Records per batch when importing
    pub batch_size: usize,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self {
            workers: 1,
            persist: false,
            batch_size: 100,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub anomaly: AnomalyCfg,
    pub quality: QualityCfg,
    pub plausibility: PlausibilityCfg,
    pub history: HistoryCfg,
    pub maintenance: MaintenanceCfg,
    pub runner: RunnerCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

fn check_path(field: &str, p: &str) -> eyre::Result<()> {
    parse_field_path(p)
        .map(drop)
        .map_err(|reason| eyre::eyre!("{field} is an invalid field path ({reason}): {p:?}"))
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Anomaly
        let a = &self.anomaly;
        if !(a.z_threshold.is_finite() && a.z_threshold > 0.0) {
            eyre::bail!("anomaly.z_threshold must be > 0");
        }
        if !(a.mad_threshold.is_finite() && a.mad_threshold > 0.0) {
            eyre::bail!("anomaly.mad_threshold must be > 0");
        }
        if a.min_history == 0 {
            eyre::bail!("anomaly.min_history must be >= 1");
        }
        if a.outlier_quorum == 0 {
            eyre::bail!("anomaly.outlier_quorum must be >= 1");
        }
        if !(a.adaptive_percentile > 0.0 && a.adaptive_percentile <= 100.0) {
            eyre::bail!("anomaly.adaptive_percentile must be in (0, 100]");
        }
        if !(a.mad_ceiling.is_finite() && a.mad_ceiling >= a.mad_threshold) {
            eyre::bail!("anomaly.mad_ceiling must be >= anomaly.mad_threshold");
        }
        check_path("anomaly.reference_parameter", &a.reference_parameter)?;
        if let Some(params) = &a.parameters {
            if params.is_empty() {
                eyre::bail!("anomaly.parameters must not be empty when set");
            }
            for p in params {
                check_path("anomaly.parameters entry", p)?;
            }
        }

        // Quality
        for (key, tol) in &self.quality.tolerances {
            check_path("quality.tolerances key", key)?;
            if !(tol.min.is_finite() && tol.max.is_finite()) {
                eyre::bail!("quality.tolerances.{key} must be finite");
            }
            if tol.max < tol.min {
                eyre::bail!("quality.tolerances.{key}: max must be >= min");
            }
        }

        // Plausibility
        if !(self.plausibility.throughput_max.is_finite() && self.plausibility.throughput_max > 0.0) {
            eyre::bail!("plausibility.throughput_max must be > 0");
        }

        // History
        if self.history.capacity == 0 {
            eyre::bail!("history.capacity must be >= 1");
        }
        if self.history.in_flight_capacity == 0 {
            eyre::bail!("history.in_flight_capacity must be >= 1");
        }
        if self.history.fetch_limit > 100_000 {
            eyre::bail!("history.fetch_limit is unreasonably large (>100000)");
        }

        // Maintenance
        if self.maintenance.horizon_days == 0 {
            eyre::bail!("maintenance.horizon_days must be >= 1");
        }
        if self.maintenance.horizon_days > 3650 {
            eyre::bail!("maintenance.horizon_days is unreasonably large (>10 years)");
        }

        // Runner
        if self.runner.workers == 0 {
            eyre::bail!("runner.workers must be >= 1");
        }
        if self.runner.workers > 256 {
            eyre::bail!("runner.workers is unreasonably large (>256)");
        }
        if self.runner.batch_size == 0 {
            eyre::bail!("runner.batch_size must be >= 1");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly, got {rot:?}");
        }

        Ok(())
    }
}
