//! Collaborator seams for the analytics core.
//!
//! The core never talks to a database or registry directly; it goes through
//! these traits so persistence and reference data can be swapped freely.
pub mod clock;

pub use clock::{Clock, SystemClock, days_between};

use chrono::{DateTime, Utc};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Records that carry an (optional) point in time.
pub trait Timestamped {
    fn timestamp(&self) -> Option<DateTime<Utc>>;
}

/// Records addressable by a stable identifier.
pub trait Identified {
    fn id(&self) -> &str;
}

/// Timestamp-ordered collection of past readings.
pub trait ReadingStore<R> {
    /// Most recent `limit` records, newest first.
    fn fetch_recent(&self, limit: usize) -> Result<Vec<R>, BoxError>;
    /// Persist annotated records; returns how many were written.
    fn insert(&self, records: &[R]) -> Result<usize, BoxError>;
}

/// Long-lived equipment reference data.
pub trait EquipmentRegistry<E> {
    fn fetch_all(&self) -> Result<Vec<E>, BoxError>;
    fn fetch_by_id(&self, id: &str) -> Result<Option<E>, BoxError>;
}
