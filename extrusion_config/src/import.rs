//! Line-export CSV import.
//!
//! The controller exports one row per sampling interval with a `Datum`
//! column (`25.06.2018 4:42`) and one column per process variable. Rows are
//! mapped onto the nested reading document used by the analytics engine.
//! Rows whose timestamp cannot be parsed are counted as failed and skipped.
//!
//! Export timestamps carry no zone; they are taken as UTC.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDateTime;
use serde_json::{Map, Value, json};

/// Column holding the row timestamp.
pub const DATE_COLUMN: &str = "Datum";
const DATE_FORMAT: &str = "%d.%m.%Y %H:%M";

/// Extruder letters and the controller's extruder numbering.
const EXTRUDERS: [(&str, u8); 3] = [("A", 1), ("B", 2), ("C", 3)];
const ZONES: [u8; 4] = [1, 3, 5, 7];
/// Dosing components per extruder, in document order.
const COMPONENTS: [u8; 4] = [2, 3, 4, 5];

/// Flat document fields and their source columns.
const FLAT_COLUMNS: &[(&str, &str)] = &[
    ("extruder_A_pressure", "ST110_VARExtr_1_druck_1_IstP"),
    ("extruder_B_pressure", "ST110_VARExtr_2_druck_1_IstP"),
    ("extruder_C_pressure", "ST110_VARExtr_3_druck_1_IstP"),
    ("extruder_A_temperature", "ST110_VARExtr_1_Massetemperatur"),
    ("extruder_B_temperature", "ST110_VARExtr_2_Massetemperatur"),
    ("extruder_C_temperature", "ST110_VARExtr_3_Massetemperatur"),
    ("total_output", "ST110_VAREx_0_GesamtDS"),
    ("target_output", "ST110_VAREx_0_SollDS"),
    ("actual_thickness", "ST110_VAREx_0_SDickeIst"),
    ("target_thickness", "ST110_VAREx_0_SDickeSoll"),
    ("blower_load_1", "ST110_VARGeblaese_1_Auslastung"),
    ("blower_load_2", "ST110_VARGeblaese_2_Auslastung"),
    ("blower_exhaust_actual", "ST110_VARIBC_1_Ist_n_Calc"),
    ("blower_exhaust_setpoint", "ST110_VARIBC_1_Soll_n_Visu"),
    ("winder_1_length", "ST113_VARActLen"),
    ("winder_2_length", "ST114_VARActLen"),
    ("winder_1_remaining_time", "ST113_VARRemainingTimeVis"),
    ("winder_2_remaining_time", "ST114_VARRemainingTimeVis"),
];

#[derive(Debug, Default)]
pub struct ImportReport {
    /// Mapped reading documents, in file order.
    pub rows: Vec<Value>,
    /// Data rows seen, including failed ones.
    pub total: usize,
    /// Rows skipped for an invalid timestamp or a malformed record.
    pub failed: usize,
}

impl ImportReport {
    pub fn imported(&self) -> usize {
        self.rows.len()
    }
}

/// Parse `dd.mm.yyyy H:MM`.
pub fn parse_export_date(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

/// Leading-number parse: `"12.5 bar"` is 12.5, anything unparseable is 0.
pub fn parse_number(s: &str) -> f64 {
    let s = s.trim();
    if let Ok(v) = s.parse::<f64>() {
        return if v.is_finite() { v } else { 0.0 };
    }
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_digit = false;
    for (i, c) in s.char_indices() {
        match c {
            '+' | '-' if i == 0 => {}
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end = i + c.len_utf8();
    }
    if !seen_digit {
        return 0.0;
    }
    s[..end].trim_end_matches('.').parse::<f64>().unwrap_or(0.0)
}

/// `total / target × 100`, capped at 100 and rounded to two decimals.
/// A zero target counts as 1.
pub fn efficiency(total: f64, target: f64) -> f64 {
    let target = if target == 0.0 { 1.0 } else { target };
    let e = (total / target * 100.0).min(100.0);
    (e * 100.0).round() / 100.0
}

struct Row<'a> {
    columns: &'a HashMap<String, usize>,
    record: &'a csv::StringRecord,
}

impl Row<'_> {
    fn raw(&self, column: &str) -> Option<&str> {
        self.columns.get(column).and_then(|i| self.record.get(*i))
    }

    fn num(&self, column: &str) -> f64 {
        self.raw(column).map_or(0.0, parse_number)
    }
}

fn map_row(row: &Row<'_>) -> Option<Value> {
    let ts = parse_export_date(row.raw(DATE_COLUMN)?)?;
    let mut doc = Map::new();
    doc.insert(
        "timestamp".into(),
        Value::String(ts.and_utc().to_rfc3339()),
    );
    for (field, column) in FLAT_COLUMNS {
        doc.insert((*field).into(), json!(row.num(column)));
    }

    let mut heating = Map::new();
    let mut materials = Map::new();
    for (letter, n) in EXTRUDERS {
        let mut zones = Map::new();
        for z in ZONES {
            let base = format!("ST110_VARExtr_{n}_HeizungZone_{z}");
            zones.insert(
                format!("zone_{z}"),
                json!({
                    "setpoint": row.num(&format!("{base}_Regler_X")),
                    "actual": row.num(&format!("{base}_Regler_Y")),
                    "power": row.num(&format!("{base}_ActEffectPower")),
                }),
            );
        }
        heating.insert(format!("extruder_{letter}"), Value::Object(zones));

        let components: Vec<Value> = COMPONENTS
            .iter()
            .map(|c| {
                let base = format!("ST110_VAREx_{n}_Dos_{c}");
                json!({
                    "component": c,
                    "actual_ratio": row.num(&format!("{base}_IstAnteil")),
                    "target_ratio": row.num(&format!("{base}_SollAnteil")),
                    "density": row.num(&format!("{base}_SollDichte")),
                })
            })
            .collect();
        materials.insert(format!("extruder_{letter}"), Value::Array(components));
    }
    doc.insert("heating_zones".into(), Value::Object(heating));
    doc.insert("materials".into(), Value::Object(materials));

    let total = row.num("ST110_VAREx_0_GesamtDS");
    let target = row.num("ST110_VAREx_0_SollDS");
    doc.insert("efficiency".into(), json!(efficiency(total, target)));
    Some(Value::Object(doc))
}

pub fn import_line_csv_reader<R: Read>(reader: R) -> eyre::Result<ImportReport> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers: {}", e))?
        .clone();
    let columns: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.to_string(), i))
        .collect();
    if !columns.contains_key(DATE_COLUMN) {
        eyre::bail!("line export CSV must have a '{DATE_COLUMN}' column");
    }

    let mut report = ImportReport::default();
    for (idx, rec) in rdr.records().enumerate() {
        let record = match rec {
            Ok(r) if r.iter().all(str::is_empty) => continue,
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(row = idx + 2, error = %e, "unreadable CSV row");
                report.total += 1;
                report.failed += 1;
                continue;
            }
        };
        report.total += 1;
        let row = Row {
            columns: &columns,
            record: &record,
        };
        if let Some(doc) = map_row(&row) {
            report.rows.push(doc);
        } else {
            tracing::warn!(
                row = idx + 2,
                datum = row.raw(DATE_COLUMN).unwrap_or_default(),
                "invalid timestamp, row skipped"
            );
            report.failed += 1;
        }
    }
    tracing::info!(
        total = report.total,
        imported = report.imported(),
        failed = report.failed,
        "line export imported"
    );
    Ok(report)
}

pub fn import_line_csv(path: &Path) -> eyre::Result<ImportReport> {
    let file = std::fs::File::open(path)
        .map_err(|e| eyre::eyre!("open line export CSV {:?}: {}", path, e))?;
    import_line_csv_reader(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_export_dates() {
        let dt = parse_export_date("25.06.2018 4:42").unwrap();
        assert_eq!(dt.to_string(), "2018-06-25 04:42:00");
        assert!(parse_export_date("2018-06-25 04:42").is_none());
        assert!(parse_export_date("32.01.2018 4:42").is_none());
        assert!(parse_export_date("").is_none());
    }

    #[test]
    fn lenient_numbers() {
        assert_eq!(parse_number("12.5"), 12.5);
        assert_eq!(parse_number(" -3 "), -3.0);
        assert_eq!(parse_number("12.5bar"), 12.5);
        assert_eq!(parse_number("12,5"), 12.0);
        assert_eq!(parse_number(""), 0.0);
        assert_eq!(parse_number("n/a"), 0.0);
        assert_eq!(parse_number("NaN"), 0.0);
    }

    #[test]
    fn efficiency_is_capped_and_rounded() {
        assert_eq!(efficiency(300.0, 320.0), 93.75);
        assert_eq!(efficiency(400.0, 320.0), 100.0);
        assert_eq!(efficiency(0.5, 0.0), 50.0);
        assert_eq!(efficiency(1.0, 3.0), 33.33);
    }
}
