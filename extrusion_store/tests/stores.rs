use std::io::Write;

use chrono::{Duration, TimeZone, Utc};
use extrusion_core::equipment::{Equipment, EquipmentType};
use extrusion_core::AnalyticsRunner;
use extrusion_core::reading::{AnnotatedReading, AnomalyAnnotation, Reading};
use extrusion_store::{JsonEquipmentRegistry, JsonlStore, MemoryStore, StoreError};
use extrusion_traits::{EquipmentRegistry, ReadingStore};
use rstest::rstest;
use serde_json::json;

fn rec(minute: i64) -> AnnotatedReading {
    let ts = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap() + Duration::minutes(minute);
    AnnotatedReading::from(Reading::from_value(json!({
        "timestamp": ts.to_rfc3339(),
        "total_output": 320.0 + minute as f64,
        "heating_zones": { "extruder_A": { "zone_1": { "setpoint": 200.0, "actual": 201.5 } } },
    })))
}

fn untimed() -> AnnotatedReading {
    AnnotatedReading::from(Reading::from_value(json!({ "total_output": 1.0 })))
}

#[rstest]
#[case(10, 5)]
#[case(3, 3)]
#[case(0, 0)]
fn memory_store_fetches_newest_first(#[case] limit: usize, #[case] expected: usize) {
    let store = MemoryStore::with_records(vec![rec(2), untimed(), rec(4), rec(1), rec(3)]);
    let got = store.fetch_recent(limit).unwrap();
    assert_eq!(got.len(), expected);
    let stamps: Vec<_> = got.iter().map(|r| r.reading.timestamp).collect();
    let mut sorted = stamps.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(stamps, sorted);
    if expected == 5 {
        assert!(got[4].reading.timestamp.is_none());
    }
}

#[test]
fn memory_store_insert_counts() {
    let store = MemoryStore::new();
    assert!(store.is_empty());
    assert_eq!(store.insert(&[rec(0), rec(1)]).unwrap(), 2);
    assert_eq!(store.len(), 2);
    assert_eq!(store.snapshot()[1], rec(1));
}

#[test]
fn jsonl_round_trips_annotated_records() {
    let dir = tempfile::tempdir().unwrap();
    let store: JsonlStore<AnnotatedReading> = JsonlStore::open(dir.path().join("readings.jsonl"));
    assert!(store.fetch_recent(10).unwrap().is_empty());

    let mut flagged = rec(5);
    flagged.anomaly = Some(AnomalyAnnotation {
        score: 0.4,
        is_anomaly: true,
        ..AnomalyAnnotation::default()
    });
    store.insert(&[rec(1), flagged.clone()]).unwrap();
    store.insert(&[rec(3)]).unwrap();

    let got = store.fetch_recent(2).unwrap();
    assert_eq!(got.len(), 2);
    assert_eq!(got[0], flagged);
    assert_eq!(got[1], rec(3));
    assert_eq!(store.read_all().unwrap().len(), 3);
}

#[test]
fn payload_annotation_keys_survive_a_persisting_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("readings.jsonl");
    let runner = AnalyticsRunner::builder()
        .with_store(JsonlStore::<AnnotatedReading>::open(&path).strict(true))
        .with_persist(true)
        .build()
        .unwrap();
    let report = runner
        .process_json(&json!([{
            "timestamp": "2024-03-01T08:00:00Z",
            "total_output": 320,
            "target_output": 320,
            "anomaly": "operator-flag",
        }]))
        .unwrap();
    assert_eq!(report.persisted, 1);
    assert!(report.persist_error.is_none());

    let line = std::fs::read_to_string(&path).unwrap();
    assert_eq!(line.matches("\"anomaly\"").count(), 1);
    let got = runner.store().fetch_recent(10).unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].anomaly, report.records[0].anomaly);
    assert!(got[0].quality.is_some());
}

#[test]
fn jsonl_skips_malformed_lines_unless_strict() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("readings.jsonl");
    {
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "{}", serde_json::to_string(&rec(1)).unwrap()).unwrap();
        writeln!(f).unwrap();
        writeln!(f, "{{ not json").unwrap();
        writeln!(f, "{}", serde_json::to_string(&rec(2)).unwrap()).unwrap();
    }
    let lenient: JsonlStore<AnnotatedReading> = JsonlStore::open(&path);
    assert_eq!(lenient.read_all().unwrap().len(), 2);

    let strict: JsonlStore<AnnotatedReading> = JsonlStore::open(&path).strict(true);
    match strict.read_all() {
        Err(StoreError::Decode { line, .. }) => assert_eq!(line, 3),
        other => panic!("expected Decode error, got {other:?}"),
    }
}

#[test]
fn registry_loads_documents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("equipment.json");
    std::fs::write(
        &path,
        r#"[
            { "_id": "ext-a", "name": "Extruder A", "type": "extruder" },
            { "id": "bl-1", "name": "Blower 1", "type": "blower", "status": "maintenance" }
        ]"#,
    )
    .unwrap();
    let reg: JsonEquipmentRegistry<Equipment> = JsonEquipmentRegistry::from_path(&path).unwrap();
    assert_eq!(reg.len(), 2);
    assert_eq!(reg.fetch_all().unwrap().len(), 2);
    let bl = reg.fetch_by_id("bl-1").unwrap().unwrap();
    assert_eq!(bl.kind, EquipmentType::Blower);
    assert!(reg.fetch_by_id("nope").unwrap().is_none());
}

#[test]
fn registry_reports_missing_and_invalid_files() {
    let dir = tempfile::tempdir().unwrap();
    let missing = JsonEquipmentRegistry::<Equipment>::from_path(&dir.path().join("absent.json"));
    assert!(matches!(missing, Err(StoreError::Io { .. })));

    let path = dir.path().join("bad.json");
    std::fs::write(&path, "{ \"id\": \"not an array\" }").unwrap();
    let bad = JsonEquipmentRegistry::<Equipment>::from_path(&path);
    assert!(matches!(bad, Err(StoreError::Decode { .. })));
}
