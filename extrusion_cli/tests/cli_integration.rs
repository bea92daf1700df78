use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Small but complete config; values are the shipped defaults except workers
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[anomaly]
z_threshold = 3.0
mad_threshold = 3.5
min_history = 10
outlier_quorum = 3

[plausibility]
throughput_max = 1000.0

[history]
capacity = 100
fetch_limit = 50
in_flight_capacity = 100

[runner]
workers = 2
batch_size = 2
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

// Three valid rows and one with an unparseable date
fn write_line_export(dir: &tempfile::TempDir) -> PathBuf {
    let csv = "\
Datum,ST110_VAREx_0_GesamtDS,ST110_VAREx_0_SollDS,ST110_VAREx_0_SDickeIst,ST110_VAREx_0_SDickeSoll,ST110_VARExtr_1_druck_1_IstP
25.06.2018 4:42,320.5,320,25.1,25,450
25.06.2018 4:43,319.0,320,24.9,25,452
not a date,318.0,320,25.0,25,449
25.06.2018 4:44,321.2,320,25.0,25,448
";
    let path = dir.path().join("line.csv");
    fs::write(&path, csv).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["health"], 0, "ok", "stdout")]
#[case(&["self-check"], 0, "config ok", "stdout")]
#[case(&["analyze"], 2, "required", "stderr")]
#[case(&["analyze", "--input", "/definitely/missing/readings.jsonl"], 4, "could not be read", "stderr")]
#[case(&["predict", "--equipment", "/definitely/missing/units.json"], 4, "Could not access", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("extrusion").unwrap();
    cmd.arg("--config").arg(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
#[case("[anomaly]\nz_threshold = 0.0\n", "z_threshold")]
#[case("[history]\ncapacity = 0\n", "history.capacity")]
#[case("this is = = not toml", "parse")]
fn invalid_config_exits_with_three(#[case] body: &str, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("bad.toml");
    fs::write(&cfg, body).unwrap();

    Command::cargo_bin("extrusion")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("health")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Configuration could not be loaded"))
        .stderr(predicate::str::contains(needle));
}

#[test]
fn analyze_line_export_and_reuse_the_store() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let csv = write_line_export(&dir);
    let store = dir.path().join("history.jsonl");

    Command::cargo_bin("extrusion")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .args(["analyze", "--persist", "--input"])
        .arg(&csv)
        .arg("--store")
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("batch 1: 2 records"))
        .stdout(predicate::str::contains("batch 2: 1 records"))
        .stdout(predicate::str::contains("analyzed 3 records in 2 batches"))
        .stdout(predicate::str::contains("3 persisted"))
        .stdout(predicate::str::contains("1 input rows skipped"));

    let persisted = fs::read_to_string(&store).unwrap();
    assert_eq!(persisted.lines().count(), 3);
    for line in persisted.lines() {
        let v: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(v["anomaly"].is_object());
        assert!(v["quality"]["score"].is_u64());
    }

    // second run compares against the persisted history
    Command::cargo_bin("extrusion")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .args(["analyze", "--batch-size", "10", "--input"])
        .arg(&csv)
        .arg("--store")
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("window 3"));
}

#[test]
fn zero_batch_size_is_a_config_error() {
    let dir = tempdir().unwrap();
    let csv = write_line_export(&dir);
    Command::cargo_bin("extrusion")
        .unwrap()
        .args(["analyze", "--batch-size", "0", "--input"])
        .arg(&csv)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("batch size"));
}

#[test]
fn csv_without_date_column_is_rejected() {
    let dir = tempdir().unwrap();
    let csv = dir.path().join("bad.csv");
    fs::write(&csv, "Time,ST110_VAREx_0_GesamtDS\n4:42,320\n").unwrap();
    Command::cargo_bin("extrusion")
        .unwrap()
        .args(["analyze", "--input"])
        .arg(&csv)
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Invalid headers"));
}

#[test]
fn predict_prints_one_line_per_unit() {
    let dir = tempdir().unwrap();
    let units = dir.path().join("units.json");
    fs::write(
        &units,
        r#"[
  { "_id": "ext-a", "name": "Extruder A", "type": "extruder",
    "lastMaintenanceDate": "2020-01-01T00:00:00Z",
    "sensors": [ { "name": "melt", "type": "temperature", "unit": "C", "normalRange": { "min": 180, "max": 220 } } ] },
  { "_id": "winder-1", "name": "Winder 1", "type": "winder" }
]"#,
    )
    .unwrap();
    let readings = dir.path().join("readings.json");
    fs::write(&readings, r#"{ "ext-a": { "extruder_A_temperature": 240.0 } }"#).unwrap();

    Command::cargo_bin("extrusion")
        .unwrap()
        .args(["predict", "--equipment"])
        .arg(&units)
        .arg("--readings")
        .arg(&readings)
        .assert()
        .success()
        .stdout(predicate::str::contains("ext-a"))
        .stdout(predicate::str::contains("winder-1"))
        .stdout(predicate::str::contains("risk"));
}
