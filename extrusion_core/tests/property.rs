use chrono::{DateTime, Duration, TimeZone, Utc};
use extrusion_core::config::MaintenanceCfg;
use extrusion_core::equipment::{Equipment, EquipmentType, MaintenanceEvent, MaintenanceType, Sensor, SensorType};
use extrusion_core::maintenance::MaintenancePredictor;
use extrusion_core::quality::{cpk_to_score, deviation_score};
use extrusion_core::stats::{mad_scores, mean, percentile, population_std_dev, z_scores};
use extrusion_core::{NormalRange, Reading, Tolerance};
use proptest::prelude::*;
use serde_json::json;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

fn event(days_ago: i64, kind: MaintenanceType) -> MaintenanceEvent {
    MaintenanceEvent {
        date: now() - Duration::days(days_ago),
        kind,
        description: None,
        technician: None,
        parts: Vec::new(),
        cost: None,
    }
}

/// Extruder with a pressure sensor, `preventive` routine jobs and
/// `emergencies` emergency jobs within the last year.
fn extruder(installed_days_ago: i64, preventive: usize, emergencies: usize) -> Equipment {
    let mut eq = Equipment::new("ext", EquipmentType::Extruder);
    eq.installation_date = Some(now() - Duration::days(installed_days_ago));
    eq.last_maintenance_date = Some(now() - Duration::days(60));
    eq.maintenance_history = (0..preventive)
        .map(|_| event(100, MaintenanceType::Preventive))
        .chain((0..emergencies).map(|_| event(20, MaintenanceType::Emergency)))
        .collect();
    eq.sensors = vec![Sensor {
        name: "melt pressure".into(),
        data_point_id: None,
        kind: SensorType::Pressure,
        unit: "bar".into(),
        normal_range: Some(NormalRange::new(300.0, 500.0)),
    }];
    eq
}

fn score(eq: &Equipment, pressure: f64) -> f64 {
    let reading = Reading::from_value(json!({ "extruder_A_pressure": pressure }));
    MaintenancePredictor::new(MaintenanceCfg::default())
        .predict_at(eq, Some(&reading), now())
        .composite_score
}

fn sample() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-1.0e4..1.0e4_f64, 2..200)
}

proptest! {
    #[test]
    fn z_scores_are_standardised(xs in sample()) {
        prop_assume!(population_std_dev(&xs) > 1e-6);
        let z = z_scores(&xs);
        prop_assert!(mean(&z).abs() < 1e-6);
        prop_assert!((population_std_dev(&z) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mad_scores_are_scale_and_shift_invariant(xs in sample(), k in 0.01..100.0_f64, c in -500.0..500.0_f64) {
        let base = mad_scores(&xs);
        let moved: Vec<f64> = xs.iter().map(|x| x * k + c).collect();
        let scaled = mad_scores(&moved);
        prop_assert_eq!(base.len(), scaled.len());
        for (a, b) in base.iter().zip(&scaled) {
            prop_assert!(*b >= 0.0);
            prop_assert!((a - b).abs() <= 1e-6 * a.abs().max(1.0));
        }
    }

    #[test]
    fn percentile_stays_within_sample(xs in sample(), p in 0.1..=100.0_f64) {
        let v = percentile(&xs, p);
        let lo = xs.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(v >= lo && v <= hi);
    }

    #[test]
    fn deviation_score_never_grows_with_distance(
        target in -100.0..100.0_f64,
        half in 0.01..50.0_f64,
        d1 in 0.0..200.0_f64,
        d2 in 0.0..200.0_f64,
    ) {
        let tol = Tolerance::symmetric(half);
        let (near, far) = if d1 <= d2 { (d1, d2) } else { (d2, d1) };
        let s_near = deviation_score(target + near, target, tol);
        let s_far = deviation_score(target - far, target, tol);
        prop_assert!((0.0..=1.0).contains(&s_near));
        prop_assert!(s_far <= s_near + 1e-9);
    }

    #[test]
    fn cpk_score_is_bounded_and_monotone(a in -5.0..5.0_f64, b in -5.0..5.0_f64) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!((0.0..=50.0).contains(&cpk_to_score(lo)));
        prop_assert!(cpk_to_score(lo) <= cpk_to_score(hi));
    }

    #[test]
    fn older_units_never_score_higher(a in 0..8_000_i64, b in 0..8_000_i64) {
        let (young, old) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(score(&extruder(old, 2, 0), 400.0) <= score(&extruder(young, 2, 0), 400.0));
    }

    #[test]
    fn more_emergencies_never_score_higher(base in 0..6_usize, a in 0..8_usize, b in 0..8_usize) {
        let (few, many) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(score(&extruder(1000, base, many), 400.0) <= score(&extruder(1000, base, few), 400.0) + 1e-9);
    }

    #[test]
    fn larger_sensor_excess_never_scores_higher(a in 0.0..2_000.0_f64, b in 0.0..2_000.0_f64) {
        let (near, far) = if a <= b { (a, b) } else { (b, a) };
        let eq = extruder(1000, 2, 1);
        let s_near = score(&eq, 500.0 + near);
        let s_far = score(&eq, 500.0 + far);
        prop_assert!((0.0..=100.0).contains(&s_far));
        prop_assert!(s_far <= s_near);
    }
}
