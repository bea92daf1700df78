//! Comparison population for the detector and the capability calculation.
//!
//! `HistoricalWindow` is a bounded buffer ordered newest-first with a
//! timestamp set for de-duplication. Only plausible, timestamped readings are
//! admitted, so a corrupt row can never skew the statistics.
//!
//! `InFlightBuffer` accumulates records processed earlier in the same run so
//! the next batch sees them before they reach the store.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::accessor::FieldPath;
use crate::config::PlausibilityCfg;
use crate::reading::{AnnotatedReading, Reading};

#[derive(Debug, Clone)]
pub struct HistoricalWindow {
    capacity: usize,
    entries: VecDeque<Reading>,
    seen: HashSet<DateTime<Utc>>,
}

impl HistoricalWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Empty window; every parameter takes the cold-start path.
    pub fn empty() -> Self {
        Self::with_capacity(0)
    }

    /// Merge a persisted fetch with the in-flight records of this run.
    ///
    /// Persisted entries win over in-flight entries with the same timestamp.
    /// The newest `capacity` admissible readings are kept.
    pub fn assemble<'a, P, F>(
        persisted: P,
        in_flight: F,
        capacity: usize,
        gate: &PlausibilityCfg,
    ) -> Self
    where
        P: IntoIterator<Item = &'a AnnotatedReading>,
        F: IntoIterator<Item = &'a AnnotatedReading>,
    {
        let mut window = Self::with_capacity(capacity);
        let mut from_store = 0usize;
        let mut from_run = 0usize;
        for rec in persisted {
            if window.admit(&rec.reading, gate) {
                from_store += 1;
            }
        }
        for rec in in_flight {
            if window.admit(&rec.reading, gate) {
                from_run += 1;
            }
        }
        tracing::debug!(
            from_store,
            from_run,
            len = window.len(),
            capacity,
            "historical window assembled"
        );
        window
    }

    /// Insert a reading at its timestamp position. Returns `false` when the
    /// reading is rejected (implausible, untimestamped, duplicate) or is older
    /// than everything in a full window.
    pub fn admit(&mut self, reading: &Reading, gate: &PlausibilityCfg) -> bool {
        let Some(ts) = reading.timestamp else {
            return false;
        };
        if self.capacity == 0 || !gate.admits(reading) || self.seen.contains(&ts) {
            return false;
        }
        if self.entries.len() == self.capacity {
            let oldest = self.entries.back().and_then(|r| r.timestamp);
            if oldest.is_some_and(|o| ts <= o) {
                return false;
            }
            if let Some(evicted) = self.entries.pop_back()
                && let Some(t) = evicted.timestamp
            {
                self.seen.remove(&t);
            }
        }
        // newest-first: position after every entry that is strictly newer
        let pos = self
            .entries
            .partition_point(|r| r.timestamp.is_some_and(|t| t > ts));
        self.entries.insert(pos, reading.clone());
        self.seen.insert(ts);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.seen.contains(ts)
    }

    /// Readings, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.entries.iter()
    }

    /// Finite values of `path` across the window, newest first.
    pub fn values(&self, path: &FieldPath) -> Vec<f64> {
        self.entries.iter().filter_map(|r| r.number(path)).collect()
    }
}

/// Append-only, cap-bounded accumulation of records processed in this run.
///
/// Appends take the lock for the whole batch, so concurrent batch
/// invocations never interleave their records.
#[derive(Debug)]
pub struct InFlightBuffer {
    capacity: usize,
    inner: Mutex<VecDeque<AnnotatedReading>>,
}

impl InFlightBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append records in processing order and trim to the newest `capacity`.
    pub fn append(&self, records: &[AnnotatedReading]) {
        let mut buf = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        buf.extend(records.iter().cloned());
        let excess = buf.len().saturating_sub(self.capacity);
        buf.drain(..excess);
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<AnnotatedReading> {
        let buf = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        buf.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn at(minute: i64, output: f64) -> AnnotatedReading {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let ts = t0 + Duration::minutes(minute);
        AnnotatedReading::from(Reading::from_value(json!({
            "timestamp": ts.to_rfc3339(),
            "total_output": output,
        })))
    }

    #[test]
    fn keeps_newest_first_and_evicts_oldest() {
        let gate = PlausibilityCfg::default();
        let recs: Vec<_> = (0..5).map(|m| at(m, 320.0 + m as f64)).collect();
        let w = HistoricalWindow::assemble(recs.iter(), std::iter::empty(), 3, &gate);
        assert_eq!(w.len(), 3);
        let outs = w.values(&FieldPath::key("total_output"));
        assert_eq!(outs, vec![324.0, 323.0, 322.0]);
    }

    #[test]
    fn deduplicates_by_timestamp_preferring_persisted() {
        let gate = PlausibilityCfg::default();
        let persisted = vec![at(1, 320.0)];
        let in_flight = vec![at(1, 999.0), at(2, 321.0)];
        let w = HistoricalWindow::assemble(persisted.iter(), in_flight.iter(), 10, &gate);
        assert_eq!(w.len(), 2);
        assert_eq!(
            w.values(&FieldPath::key("total_output")),
            vec![321.0, 320.0]
        );
    }

    #[test]
    fn rejects_implausible_and_untimestamped() {
        let gate = PlausibilityCfg::default();
        let mut w = HistoricalWindow::with_capacity(10);
        assert!(!w.admit(&at(0, 0.0).reading, &gate));
        assert!(!w.admit(&at(1, 5000.0).reading, &gate));
        let no_ts = Reading::from_value(json!({ "total_output": 320.0 }));
        assert!(!w.admit(&no_ts, &gate));
        assert!(w.is_empty());
    }

    #[test]
    fn older_than_full_window_is_rejected() {
        let gate = PlausibilityCfg::default();
        let mut w = HistoricalWindow::with_capacity(2);
        assert!(w.admit(&at(5, 320.0).reading, &gate));
        assert!(w.admit(&at(6, 320.0).reading, &gate));
        assert!(!w.admit(&at(1, 320.0).reading, &gate));
        assert!(w.admit(&at(7, 320.0).reading, &gate));
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn in_flight_buffer_trims_to_newest() {
        let buf = InFlightBuffer::new(3);
        let recs: Vec<_> = (0..5).map(|m| at(m, 320.0)).collect();
        buf.append(&recs[..2]);
        buf.append(&recs[2..]);
        let snap = buf.snapshot();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap[0], recs[2]);
        assert_eq!(snap[2], recs[4]);
    }
}
