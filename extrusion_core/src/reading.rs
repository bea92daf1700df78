//! Readings, their annotations, and the plausibility gate.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeZone, Utc};
use extrusion_traits::Timestamped;
use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::accessor::FieldPath;
use crate::config::PlausibilityCfg;
use crate::error::AnalyticsError;
use crate::types::NormalRange;

/// One multi-parameter measurement of the line.
///
/// `timestamp` is `None` when the source value was missing or unparseable;
/// such readings can still be annotated but never enter history or storage.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Reading {
    #[serde(default, deserialize_with = "de_lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Reading {
    pub fn new(timestamp: Option<DateTime<Utc>>, fields: Map<String, Value>) -> Self {
        Self { timestamp, fields }
    }

    /// Strict conversion: anything but a JSON object is malformed.
    pub fn try_from_value(value: Value) -> Result<Self, AnalyticsError> {
        if !value.is_object() {
            return Err(AnalyticsError::MalformedReading(format!(
                "expected an object, got {}",
                json_kind(&value)
            )));
        }
        serde_json::from_value(value).map_err(|e| AnalyticsError::MalformedReading(e.to_string()))
    }

    /// Build from an arbitrary JSON value. Non-object values become an empty
    /// reading, which the plausibility gate then rejects.
    pub fn from_value(value: Value) -> Self {
        match Self::try_from_value(value) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(error = %e, "reading payload replaced by empty reading");
                Self::default()
            }
        }
    }

    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        path.resolve_in(&self.fields)
    }

    /// Finite numeric value at `path`.
    pub fn number(&self, path: &FieldPath) -> Option<f64> {
        path.number_in(&self.fields)
    }

    /// Number of populated top-level fields, counting the timestamp.
    pub fn field_count(&self) -> usize {
        self.fields.len() + usize::from(self.timestamp.is_some())
    }
}

impl Serialize for Reading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        write_reading(&mut map, self, &[])?;
        map.end()
    }
}

/// Writes the timestamp, then every payload field whose key is not already
/// taken by a typed entry of the same document. Output never repeats a key.
fn write_reading<M: SerializeMap>(map: &mut M, reading: &Reading, taken: &[&str]) -> Result<(), M::Error> {
    if let Some(ts) = &reading.timestamp {
        map.serialize_entry(TIMESTAMP_KEY, ts)?;
    }
    for (key, value) in &reading.fields {
        let shadowed = (reading.timestamp.is_some() && key == TIMESTAMP_KEY) || taken.contains(&key.as_str());
        if shadowed {
            tracing::debug!(key = %key, "payload field shadowed on output");
            continue;
        }
        map.serialize_entry(key, value)?;
    }
    Ok(())
}

const TIMESTAMP_KEY: &str = "timestamp";
const ANOMALY_KEY: &str = "anomaly";
const QUALITY_KEY: &str = "quality";

impl Timestamped for Reading {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }
}

fn de_lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::String(s)) => parse_timestamp(&s),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    })
}

/// Parse RFC 3339 (with or without offset) into UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// How a record-level anomaly verdict was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DetectionMethod {
    #[serde(rename = "Z-Score")]
    ZScore,
    #[serde(rename = "MAD")]
    Mad,
    /// Detection was not run (gated or failed record).
    #[default]
    #[serde(rename = "none")]
    Neutral,
}

/// Per-parameter scores behind an anomaly verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterScore {
    pub value: f64,
    pub z_score: f64,
    pub mad_score: f64,
    pub is_outlier: bool,
    /// Present when the cold-start range was used instead of history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal_range: Option<NormalRange>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnomalyAnnotation {
    pub score: f64,
    pub is_anomaly: bool,
    pub parameters: BTreeSet<String>,
    pub method: DetectionMethod,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, ParameterScore>,
}

impl AnomalyAnnotation {
    /// Safe all-zero annotation for gated or failed records.
    pub fn neutral() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Capability {
    pub cp: f64,
    pub cpk: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcessCapability {
    pub thickness: Capability,
    pub throughput: Capability,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviationDetail {
    pub actual: f64,
    pub target: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityAnnotation {
    pub score: u8,
    /// 0..=50 contribution from deviation-from-target.
    pub deviation_score: f64,
    /// 0..=50 contribution from process capability.
    pub capability_score: f64,
    pub deviation_detail: BTreeMap<String, DeviationDetail>,
    pub process_capability: ProcessCapability,
}

impl QualityAnnotation {
    /// Zero score with empty detail, used for gated or failed records.
    pub fn zero() -> Self {
        Self::default()
    }
}

/// A reading plus whatever the engine has derived for it so far.
///
/// On output an annotation replaces a payload field of the same name, so a
/// serialized record always reads back as the same annotations.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct AnnotatedReading {
    #[serde(flatten)]
    pub reading: Reading,
    #[serde(default)]
    pub anomaly: Option<AnomalyAnnotation>,
    #[serde(default)]
    pub quality: Option<QualityAnnotation>,
}

impl Serialize for AnnotatedReading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut taken = Vec::with_capacity(2);
        if self.anomaly.is_some() {
            taken.push(ANOMALY_KEY);
        }
        if self.quality.is_some() {
            taken.push(QUALITY_KEY);
        }
        let mut map = serializer.serialize_map(None)?;
        write_reading(&mut map, &self.reading, &taken)?;
        if let Some(anomaly) = &self.anomaly {
            map.serialize_entry(ANOMALY_KEY, anomaly)?;
        }
        if let Some(quality) = &self.quality {
            map.serialize_entry(QUALITY_KEY, quality)?;
        }
        map.end()
    }
}

impl AnnotatedReading {
    /// Build from a stored or caller-supplied document, keeping any
    /// annotations it already carries. Unusable annotations are treated as
    /// plain fields.
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<AnnotatedReading>(value.clone()) {
            Ok(rec) if value.is_object() => rec,
            _ => Self::from(Reading::from_value(value)),
        }
    }
}

impl From<Reading> for AnnotatedReading {
    fn from(reading: Reading) -> Self {
        Self {
            reading,
            anomaly: None,
            quality: None,
        }
    }
}

impl Timestamped for AnnotatedReading {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.reading.timestamp
    }
}

impl PlausibilityCfg {
    /// Throughput must be a finite number in `(0, throughput_max]`.
    pub fn admits(&self, reading: &Reading) -> bool {
        reading
            .number(&self.throughput_field)
            .is_some_and(|v| self.admits_throughput(v))
    }

    #[inline]
    pub fn admits_throughput(&self, v: f64) -> bool {
        v.is_finite() && v > 0.0 && v <= self.throughput_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lenient_timestamp_parsing() {
        let r = Reading::from_value(json!({ "timestamp": "2018-06-25T04:42:00Z", "total_output": 320 }));
        assert!(r.timestamp.is_some());
        let bad = Reading::from_value(json!({ "timestamp": "25.06.2018 4:42", "total_output": 320 }));
        assert!(bad.timestamp.is_none());
        assert_eq!(bad.fields.get("total_output"), Some(&json!(320)));
        let ms = Reading::from_value(json!({ "timestamp": 1_529_901_720_000i64 }));
        assert!(ms.timestamp.is_some());
    }

    #[test]
    fn non_object_payload_becomes_empty_reading() {
        let r = Reading::from_value(json!([1, 2, 3]));
        assert!(r.fields.is_empty());
        assert!(!PlausibilityCfg::default().admits(&r));
    }

    #[test]
    fn strict_conversion_rejects_scalars() {
        let err = Reading::try_from_value(json!("oops")).unwrap_err();
        assert!(matches!(err, AnalyticsError::MalformedReading(_)));
        assert!(Reading::try_from_value(json!({})).is_ok());
    }

    #[test]
    fn annotated_from_value_keeps_annotations() {
        let rec = AnnotatedReading::from_value(json!({
            "timestamp": "2024-03-01T10:00:00Z",
            "total_output": 320.0,
            "anomaly": { "score": 0.5, "is_anomaly": true, "parameters": ["total_output"], "method": "MAD" }
        }));
        let a = rec.anomaly.unwrap();
        assert!(a.is_anomaly);
        assert_eq!(a.method, DetectionMethod::Mad);
        assert!(!rec.reading.fields.contains_key("anomaly"));

        let odd = AnnotatedReading::from_value(json!({ "total_output": 1.0, "anomaly": "yes" }));
        assert!(odd.anomaly.is_none());
        assert_eq!(odd.reading.fields.get("anomaly"), Some(&json!("yes")));
    }

    #[test]
    fn plausibility_gate_bounds() {
        let gate = PlausibilityCfg::default();
        let mk = |v: Value| Reading::from_value(json!({ "total_output": v }));
        assert!(!gate.admits(&mk(json!(0))));
        assert!(!gate.admits(&mk(json!(-5.0))));
        assert!(gate.admits(&mk(json!(0.001))));
        assert!(gate.admits(&mk(json!(1000))));
        assert!(!gate.admits(&mk(json!(1000.01))));
        assert!(!gate.admits(&mk(json!("320"))));
        assert!(!gate.admits(&Reading::default()));
    }

    #[test]
    fn annotated_reading_round_trips_through_json() {
        let mut rec = AnnotatedReading::from(Reading::from_value(json!({
            "timestamp": "2024-03-01T10:00:00Z",
            "total_output": 320.0
        })));
        rec.anomaly = Some(AnomalyAnnotation::neutral());
        let text = serde_json::to_string(&rec).unwrap();
        let back: AnnotatedReading = serde_json::from_str(&text).unwrap();
        assert_eq!(back, rec);
        assert!(!back.reading.fields.contains_key("anomaly"));
    }

    #[test]
    fn payload_keys_never_repeat_annotation_keys() {
        let mut rec = AnnotatedReading::from_value(json!({
            "timestamp": "2024-03-01T10:00:00Z",
            "total_output": 320.0,
            "anomaly": "operator-flag",
            "quality": 7,
        }));
        assert_eq!(rec.reading.fields.get("anomaly"), Some(&json!("operator-flag")));
        rec.anomaly = Some(AnomalyAnnotation::neutral());
        rec.quality = Some(QualityAnnotation::zero());

        let text = serde_json::to_string(&rec).unwrap();
        assert_eq!(text.matches("\"anomaly\"").count(), 1);
        assert_eq!(text.matches("\"quality\"").count(), 1);
        let back: AnnotatedReading = serde_json::from_str(&text).unwrap();
        assert_eq!(back.anomaly, rec.anomaly);
        assert_eq!(back.quality, rec.quality);

        // a timestamp smuggled into the payload is shadowed by the typed one
        let mut fields = Map::new();
        fields.insert("timestamp".into(), json!("not a date"));
        let r = Reading::new(parse_timestamp("2024-03-01T10:00:00Z"), fields);
        let text = serde_json::to_string(&r).unwrap();
        assert_eq!(text.matches("timestamp").count(), 1);
        assert_eq!(serde_json::from_str::<Reading>(&text).unwrap().timestamp, r.timestamp);
    }
}
