//! `predict`: maintenance risk for every unit in an equipment registry.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use extrusion_core::config::MaintenanceCfg;
use extrusion_core::error::AnalyticsError;
use extrusion_core::{Equipment, MaintenanceAssessment, MaintenancePredictor, Reading};
use extrusion_store::JsonEquipmentRegistry;
use extrusion_traits::EquipmentRegistry;
use serde_json::Value;

/// Latest reading per equipment id. No file means every unit is assessed
/// without live sensor values.
pub fn load_readings(path: Option<&Path>) -> eyre::Result<HashMap<String, Reading>> {
    let Some(path) = path else {
        return Ok(HashMap::new());
    };
    let text = fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read input {}: {}", path.display(), e))?;
    let value: Value = serde_json::from_str(&text)
        .map_err(|e| AnalyticsError::InvalidBatch(format!("readings file is not valid JSON: {e}")))?;
    let Value::Object(by_id) = value else {
        return Err(AnalyticsError::InvalidBatch(
            "readings file must be a JSON object keyed by equipment id".into(),
        )
        .into());
    };
    Ok(by_id
        .into_iter()
        .map(|(id, doc)| (id, Reading::from_value(doc)))
        .collect())
}

pub fn run_predict(
    cfg: MaintenanceCfg,
    equipment: &Path,
    readings: Option<&Path>,
) -> eyre::Result<Vec<MaintenanceAssessment>> {
    let registry = JsonEquipmentRegistry::<Equipment>::from_path(equipment)?;
    let units = registry
        .fetch_all()
        .map_err(|e| eyre::eyre!("equipment registry: {e}"))?;
    let readings = load_readings(readings)?;
    for id in readings.keys().filter(|id| !units.iter().any(|u| &u.id == *id)) {
        tracing::warn!(equipment_id = %id, "reading for unknown equipment ignored");
    }
    let out = MaintenancePredictor::new(cfg).predict_batch(&units, &readings);
    tracing::info!(units = out.len(), "maintenance assessed");
    Ok(out)
}

pub fn print_assessments(assessments: &[MaintenanceAssessment], json: bool) -> eyre::Result<()> {
    for a in assessments {
        if json {
            println!("{}", serde_json::to_string(a)?);
            continue;
        }
        let p = &a.maintenance_prediction;
        println!(
            "{:<20} health {:>5.2}  score {:>6.2}  risk {:<8}  due in {:>3} days ({})  confidence {:.2}",
            a.equipment_id,
            a.health_score,
            a.composite_score,
            p.risk_level,
            p.days_to_maintenance,
            p.next_maintenance_date.format("%Y-%m-%d"),
            p.confidence,
        );
    }
    Ok(())
}
