//! `From` implementations bridging `extrusion_config` types to `extrusion_core` types.

use crate::accessor::FieldPath;
use crate::config::{
    AnomalyCfg, HistoryCfg, MaintenanceCfg, PlausibilityCfg, QualityCfg, RunnerCfg, Settings,
    THROUGHPUT_FIELD, default_anomaly_parameters,
};
use crate::types::Tolerance;

// ── AnomalyCfg ───────────────────────────────────────────────────────────────

impl From<&extrusion_config::AnomalyCfg> for AnomalyCfg {
    fn from(c: &extrusion_config::AnomalyCfg) -> Self {
        Self {
            z_threshold: c.z_threshold,
            mad_threshold: c.mad_threshold,
            min_history: c.min_history,
            outlier_quorum: c.outlier_quorum,
            adaptive_min_points: c.adaptive_min_points,
            adaptive_percentile: c.adaptive_percentile,
            mad_ceiling: c.mad_ceiling,
            reference_parameter: c.reference_parameter.clone(),
            parameters: c
                .parameters
                .clone()
                .unwrap_or_else(default_anomaly_parameters),
        }
    }
}

// ── QualityCfg ───────────────────────────────────────────────────────────────

impl From<&extrusion_config::ToleranceCfg> for Tolerance {
    fn from(c: &extrusion_config::ToleranceCfg) -> Self {
        Self {
            min: c.min,
            max: c.max,
        }
    }
}

impl From<&extrusion_config::QualityCfg> for QualityCfg {
    fn from(c: &extrusion_config::QualityCfg) -> Self {
        Self {
            tolerances: c
                .tolerances
                .iter()
                .map(|(k, v)| (k.clone(), Tolerance::from(v)))
                .collect(),
        }
    }
}

// ── PlausibilityCfg ──────────────────────────────────────────────────────────

impl From<&extrusion_config::PlausibilityCfg> for PlausibilityCfg {
    fn from(c: &extrusion_config::PlausibilityCfg) -> Self {
        Self {
            throughput_field: FieldPath::key(THROUGHPUT_FIELD),
            throughput_max: c.throughput_max,
        }
    }
}

// ── HistoryCfg ───────────────────────────────────────────────────────────────

impl From<&extrusion_config::HistoryCfg> for HistoryCfg {
    fn from(c: &extrusion_config::HistoryCfg) -> Self {
        Self {
            capacity: c.capacity,
            fetch_limit: c.fetch_limit,
            in_flight_capacity: c.in_flight_capacity,
        }
    }
}

// ── MaintenanceCfg ───────────────────────────────────────────────────────────

impl From<&extrusion_config::MaintenanceCfg> for MaintenanceCfg {
    fn from(c: &extrusion_config::MaintenanceCfg) -> Self {
        Self {
            horizon_days: c.horizon_days,
        }
    }
}

// ── RunnerCfg ────────────────────────────────────────────────────────────────

impl From<&extrusion_config::RunnerCfg> for RunnerCfg {
    fn from(c: &extrusion_config::RunnerCfg) -> Self {
        Self {
            workers: c.workers,
            persist: c.persist,
        }
    }
}

// ── Settings ─────────────────────────────────────────────────────────────────

impl From<&extrusion_config::Config> for Settings {
    fn from(c: &extrusion_config::Config) -> Self {
        Self {
            anomaly: (&c.anomaly).into(),
            plausibility: (&c.plausibility).into(),
            quality: (&c.quality).into(),
            history: (&c.history).into(),
            maintenance: (&c.maintenance).into(),
            runner: (&c.runner).into(),
        }
    }
}
