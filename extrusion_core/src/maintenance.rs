//! Predictive maintenance from a weighted composite health model.
//!
//! Four independent penalties are subtracted from 100:
//!
//! | factor     | max | driver                                         |
//! |------------|-----|------------------------------------------------|
//! | recency    | 12.5| days since last maintenance vs service interval|
//! | age        | 15  | years in service vs a 10-year lifespan         |
//! | history    | 20  | emergency/corrective share over the last year  |
//! | sensors    | 40  | live readings outside the sensors' ranges      |
//!
//! The clamped composite maps onto a 0..=10 health score, a risk tier and
//! a days-to-maintenance estimate.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Months, Utc};
use extrusion_traits::{Clock, SystemClock, days_between};
use serde::{Deserialize, Serialize};

use crate::accessor::FieldPath;
use crate::config::MaintenanceCfg;
use crate::equipment::{Equipment, EquipmentType, MaintenanceType, SensorType};
use crate::reading::Reading;

const DAYS_PER_YEAR: f64 = 365.0;
const NOMINAL_LIFESPAN_YEARS: f64 = 10.0;
const LOW_POWER_KW: f64 = 100.0;
const LOW_POWER_INTERVAL_DAYS: f64 = 365.0;
const STANDARD_INTERVAL_DAYS: f64 = 180.0;

const RECENCY_WEIGHT: f64 = 25.0;
const AGE_WEIGHT: f64 = 15.0;
const HISTORY_CAP: f64 = 20.0;
const SENSOR_WEIGHT: f64 = 40.0;
/// Dampens the recency and sensor penalties.
const SOFTENING: f64 = 0.5;
/// Rescales the 0..=10 health score.
const HEALTH_SCALE: f64 = 1.5;

/// Where a sensor's current value comes from in a reading.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorSource {
    Field(FieldPath),
    /// `field × factor`; a zero or missing field yields no value.
    Scaled { field: FieldPath, factor: f64 },
    Unmapped,
}

impl SensorSource {
    pub fn value(&self, reading: &Reading) -> Option<f64> {
        match self {
            Self::Field(p) => reading.number(p),
            Self::Scaled { field, factor } => reading
                .number(field)
                .filter(|v| *v != 0.0)
                .map(|v| v * factor),
            Self::Unmapped => None,
        }
    }
}

static UNMAPPED: SensorSource = SensorSource::Unmapped;

/// Maps `(equipment type, sensor type)` to a reading field.
///
/// An entry keyed with `None` applies to every equipment type without a
/// more specific entry.
#[derive(Debug, Clone, Default)]
pub struct SensorMap {
    entries: HashMap<(Option<EquipmentType>, SensorType), SensorSource>,
}

impl SensorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The line's standard wiring.
    pub fn standard() -> Self {
        Self::new()
            .with(
                Some(EquipmentType::Blower),
                SensorType::Pressure,
                SensorSource::Field(FieldPath::key("blower_load_1")),
            )
            .with(
                Some(EquipmentType::Extruder),
                SensorType::Pressure,
                SensorSource::Field(FieldPath::key("extruder_A_pressure")),
            )
            .with(None, SensorType::Pressure, SensorSource::Unmapped)
            .with(
                None,
                SensorType::Temperature,
                SensorSource::Field(FieldPath::key("extruder_A_temperature")),
            )
            .with(
                None,
                SensorType::Flow,
                SensorSource::Scaled {
                    field: FieldPath::key("total_output"),
                    factor: 5.0,
                },
            )
            .with(None, SensorType::Vibration, SensorSource::Unmapped)
    }

    #[must_use]
    pub fn with(mut self, equipment: Option<EquipmentType>, sensor: SensorType, source: SensorSource) -> Self {
        self.entries.insert((equipment, sensor), source);
        self
    }

    pub fn lookup(&self, equipment: EquipmentType, sensor: SensorType) -> &SensorSource {
        self.entries
            .get(&(Some(equipment), sensor))
            .or_else(|| self.entries.get(&(None, sensor)))
            .unwrap_or(&UNMAPPED)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    /// Tier of a 0..=100 composite score.
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::Low
        } else if score >= 60.0 {
            Self::Moderate
        } else if score >= 40.0 {
            Self::High
        } else {
            Self::Critical
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FactorPenalties {
    pub recency: f64,
    pub age: f64,
    pub history: f64,
    pub sensors: f64,
}

impl FactorPenalties {
    pub fn total(&self) -> f64 {
        self.recency + self.age + self.history + self.sensors
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenancePrediction {
    pub days_to_maintenance: u32,
    pub risk_level: RiskLevel,
    pub next_maintenance_date: DateTime<Utc>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceAssessment {
    pub equipment_id: String,
    /// 0..=10
    pub health_score: f64,
    /// Clamped 0..=100 composite the tier is derived from.
    pub composite_score: f64,
    pub penalties: FactorPenalties,
    pub maintenance_prediction: MaintenancePrediction,
}

#[derive(Debug, Clone)]
pub struct MaintenancePredictor<C: Clock = SystemClock> {
    cfg: MaintenanceCfg,
    sensors: SensorMap,
    clock: C,
}

impl MaintenancePredictor<SystemClock> {
    pub fn new(cfg: MaintenanceCfg) -> Self {
        Self::with_clock(cfg, SystemClock::new())
    }
}

impl<C: Clock> MaintenancePredictor<C> {
    pub fn with_clock(cfg: MaintenanceCfg, clock: C) -> Self {
        Self {
            cfg,
            sensors: SensorMap::standard(),
            clock,
        }
    }

    #[must_use]
    pub fn with_sensor_map(mut self, sensors: SensorMap) -> Self {
        self.sensors = sensors;
        self
    }

    pub fn predict(&self, equipment: &Equipment, reading: Option<&Reading>) -> MaintenanceAssessment {
        self.predict_at(equipment, reading, self.clock.now())
    }

    /// Each unit is evaluated against the reading mapped to its id; units
    /// without one get an empty reading.
    pub fn predict_batch(
        &self,
        equipment: &[Equipment],
        readings: &HashMap<String, Reading>,
    ) -> Vec<MaintenanceAssessment> {
        let now = self.clock.now();
        let empty = Reading::default();
        equipment
            .iter()
            .map(|eq| {
                let reading = readings.get(&eq.id).unwrap_or(&empty);
                self.predict_at(eq, Some(reading), now)
            })
            .collect()
    }

    pub fn predict_at(
        &self,
        equipment: &Equipment,
        reading: Option<&Reading>,
        now: DateTime<Utc>,
    ) -> MaintenanceAssessment {
        let penalties = FactorPenalties {
            recency: recency_penalty(equipment, now),
            age: age_penalty(equipment, now),
            history: history_penalty(equipment, now),
            sensors: reading.map_or(0.0, |r| self.sensor_penalty(equipment, r)),
        };
        let score = (100.0 - penalties.total()).clamp(0.0, 100.0);
        let health = (score / 100.0 * 10.0 * HEALTH_SCALE).round() / HEALTH_SCALE;
        let days = (score / 100.0 * f64::from(self.cfg.horizon_days)).round() as u32;
        let risk = RiskLevel::from_score(score);

        tracing::debug!(
            equipment = %equipment.id,
            score,
            recency = penalties.recency,
            age = penalties.age,
            history = penalties.history,
            sensors = penalties.sensors,
            risk = %risk,
            "maintenance assessment"
        );

        MaintenanceAssessment {
            equipment_id: equipment.id.clone(),
            health_score: health,
            composite_score: score,
            penalties,
            maintenance_prediction: MaintenancePrediction {
                days_to_maintenance: days,
                risk_level: risk,
                next_maintenance_date: now + Duration::days(i64::from(days)),
                confidence: confidence(equipment, reading, now),
            },
        }
    }

    /// Mean out-of-range deviation over sensors with a value and a range.
    fn sensor_penalty(&self, equipment: &Equipment, reading: &Reading) -> f64 {
        let mut checked = 0usize;
        let mut total = 0.0;
        for sensor in &equipment.sensors {
            let Some(range) = sensor.normal_range else {
                continue;
            };
            let Some(value) = self.sensors.lookup(equipment.kind, sensor.kind).value(reading) else {
                continue;
            };
            checked += 1;
            if range.contains(value) {
                continue;
            }
            let width = range.width();
            let deviation = if width > 0.0 {
                (range.excess(value) / width * SOFTENING).min(1.0)
            } else {
                1.0
            };
            total += deviation;
        }
        if checked == 0 {
            return 0.0;
        }
        total / checked as f64 * SENSOR_WEIGHT
    }
}

fn whole_days(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    days_between(from, to) as f64
}

fn recency_penalty(eq: &Equipment, now: DateTime<Utc>) -> f64 {
    let Some(last) = eq.last_maintenance_date else {
        return 0.0;
    };
    let interval = if eq.specifications.power_rating.is_some_and(|p| p < LOW_POWER_KW) {
        LOW_POWER_INTERVAL_DAYS
    } else {
        STANDARD_INTERVAL_DAYS
    };
    (whole_days(last, now) / interval).min(1.0) * SOFTENING * RECENCY_WEIGHT
}

fn age_penalty(eq: &Equipment, now: DateTime<Utc>) -> f64 {
    let Some(installed) = eq.installation_date else {
        return 0.0;
    };
    let years = whole_days(installed, now) / DAYS_PER_YEAR;
    (years / NOMINAL_LIFESPAN_YEARS).min(1.0) * AGE_WEIGHT
}

fn history_penalty(eq: &Equipment, now: DateTime<Utc>) -> f64 {
    if eq.maintenance_history.is_empty() {
        return 0.0;
    }
    let cutoff = now
        .checked_sub_months(Months::new(12))
        .unwrap_or_else(|| now - Duration::days(365));
    let recent: Vec<_> = eq
        .maintenance_history
        .iter()
        .filter(|e| e.date >= cutoff)
        .collect();
    let count = |k: MaintenanceType| recent.iter().filter(|e| e.kind == k).count() as f64;
    let severity = (3.0 * count(MaintenanceType::Emergency) + count(MaintenanceType::Corrective))
        / recent.len().max(1) as f64;
    (severity * 10.0).min(HISTORY_CAP)
}

fn confidence(eq: &Equipment, reading: Option<&Reading>, now: DateTime<Utc>) -> f64 {
    let mut c = 0.7;
    if !eq.maintenance_history.is_empty() {
        c += (eq.maintenance_history.len() as f64 * 0.02).min(0.1);
    }
    if let Some(r) = reading {
        c += (r.field_count() as f64 * 0.005).min(0.1);
    }
    if let Some(installed) = eq.installation_date {
        let years = ((now - installed).num_milliseconds() as f64 / (86_400_000.0 * DAYS_PER_YEAR)).max(0.0);
        c += (years * 0.01).min(0.1);
    }
    c.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_tiers() {
        assert_eq!(RiskLevel::from_score(100.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(80.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(79.99), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_score(40.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Critical);
    }

    #[test]
    fn sensor_map_prefers_specific_entry() {
        let map = SensorMap::standard();
        assert_eq!(
            map.lookup(EquipmentType::Blower, SensorType::Pressure),
            &SensorSource::Field(FieldPath::key("blower_load_1"))
        );
        assert_eq!(map.lookup(EquipmentType::Winder, SensorType::Pressure), &SensorSource::Unmapped);
        assert_eq!(
            map.lookup(EquipmentType::Heater, SensorType::Temperature),
            &SensorSource::Field(FieldPath::key("extruder_A_temperature"))
        );
        assert_eq!(map.lookup(EquipmentType::Extruder, SensorType::Other), &SensorSource::Unmapped);
    }

    #[test]
    fn flow_is_scaled_throughput_unless_zero() {
        let src = SensorMap::standard()
            .lookup(EquipmentType::Extruder, SensorType::Flow)
            .clone();
        let r = Reading::from_value(serde_json::json!({ "total_output": 320.0 }));
        assert_eq!(src.value(&r), Some(1600.0));
        let zero = Reading::from_value(serde_json::json!({ "total_output": 0 }));
        assert_eq!(src.value(&zero), None);
    }

    #[test]
    fn untouched_equipment_is_fully_healthy() {
        let p = MaintenancePredictor::new(MaintenanceCfg::default());
        let a = p.predict_at(&Equipment::new("e1", EquipmentType::Other), None, Utc::now());
        assert_eq!(a.composite_score, 100.0);
        assert_eq!(a.health_score, 10.0);
        assert_eq!(a.maintenance_prediction.days_to_maintenance, 180);
        assert_eq!(a.maintenance_prediction.risk_level, RiskLevel::Low);
        assert!((a.maintenance_prediction.confidence - 0.7).abs() < 1e-12);
    }
}
