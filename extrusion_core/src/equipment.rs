//! Equipment reference data as stored by the registry.
//!
//! Field names are camelCase on the wire; `id` also accepts the
//! document-store `_id` spelling.

use chrono::{DateTime, Utc};
use extrusion_traits::Identified;
use serde::{Deserialize, Serialize};

use crate::types::NormalRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EquipmentType {
    Extruder,
    Blower,
    Winder,
    Heater,
    Sensor,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EquipmentStatus {
    #[default]
    Operational,
    Maintenance,
    Fault,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaintenanceType {
    Preventive,
    Corrective,
    Emergency,
    Inspection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorType {
    Temperature,
    Pressure,
    Flow,
    Vibration,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceEvent {
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: MaintenanceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technician: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sensor {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_point_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: SensorType,
    #[serde(default)]
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal_range: Option<NormalRange>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Specifications {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    /// kW
    pub power_rating: Option<f64>,
    /// °C
    pub max_operating_temp: Option<f64>,
    /// bar
    pub max_pressure: Option<f64>,
    pub capacity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Equipment {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: EquipmentType,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_maintenance_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_scheduled_maintenance: Option<DateTime<Utc>>,
    #[serde(default)]
    pub specifications: Specifications,
    #[serde(default)]
    pub status: EquipmentStatus,
    #[serde(default)]
    pub maintenance_history: Vec<MaintenanceEvent>,
    #[serde(default)]
    pub sensors: Vec<Sensor>,
}

impl Equipment {
    pub fn new(id: impl Into<String>, kind: EquipmentType) -> Self {
        Self {
            id: id.into(),
            kind,
            ..Self::default()
        }
    }
}

impl Identified for Equipment {
    fn id(&self) -> &str {
        &self.id
    }
}
