//! Dotted/indexed field paths over nested readings.
//!
//! `materials.extruder_A[2].actual_ratio` descends into the `materials`
//! object, then the `extruder_A` array at index 2, then `actual_ratio`.
//! Resolution never fails loudly: any missing segment, out-of-range index or
//! type mismatch yields `None`.

use std::fmt;
use std::str::FromStr;

use extrusion_config::parse_field_path;
use serde_json::{Map, Value};

use crate::error::AnalyticsError;

pub use extrusion_config::PathSegment as Segment;

/// A parsed field path. Parse once, resolve many times.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    raw: String,
    segments: Vec<Segment>,
}

impl FieldPath {
    /// Path to a single top-level key.
    pub fn key(name: &str) -> Self {
        Self {
            raw: name.to_string(),
            segments: vec![Segment::Key(name.to_string())],
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Resolve against an arbitrary JSON value.
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(root, |cur, seg| match (seg, cur) {
                (Segment::Key(k), Value::Object(m)) => m.get(k),
                (Segment::Index(i), Value::Array(a)) => a.get(*i),
                _ => None,
            })
    }

    /// Resolve against an object's fields (the usual reading payload).
    pub fn resolve_in<'a>(&self, fields: &'a Map<String, Value>) -> Option<&'a Value> {
        let (first, rest) = self.segments.split_first()?;
        let Segment::Key(k) = first else {
            return None;
        };
        rest.iter()
            .try_fold(fields.get(k)?, |cur, seg| match (seg, cur) {
                (Segment::Key(k), Value::Object(m)) => m.get(k),
                (Segment::Index(i), Value::Array(a)) => a.get(*i),
                _ => None,
            })
    }

    /// Resolve to a finite number; strings, booleans and nulls are absent.
    pub fn number_in(&self, fields: &Map<String, Value>) -> Option<f64> {
        self.resolve_in(fields)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
    }

    /// Path with the first occurrence of `from` replaced by `to`
    /// (e.g. an `actual_ratio` path to its `target_ratio` sibling).
    pub fn sibling(&self, from: &str, to: &str) -> Option<FieldPath> {
        self.raw.replacen(from, to, 1).parse().ok()
    }
}

impl FromStr for FieldPath {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments = parse_field_path(s).map_err(|reason| AnalyticsError::InvalidPath {
            path: s.to_string(),
            reason,
        })?;
        Ok(Self {
            raw: s.to_string(),
            segments,
        })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One-shot resolution of a path string; malformed paths resolve to `None`.
pub fn resolve<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.parse::<FieldPath>().ok()?.resolve(root)
}

/// One-shot numeric resolution of a path string.
pub fn resolve_f64(root: &Value, path: &str) -> Option<f64> {
    resolve(root, path)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
}
