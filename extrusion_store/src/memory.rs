use std::sync::RwLock;

use extrusion_traits::{BoxError, ReadingStore, Timestamped};

use crate::error::StoreError;
use crate::newest_first;

/// Reading store held entirely in memory.
#[derive(Debug)]
pub struct MemoryStore<R> {
    records: RwLock<Vec<R>>,
}

impl<R> Default for MemoryStore<R> {
    fn default() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }
}

impl<R: Clone> MemoryStore<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<R>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().map_or(0, |r| r.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Everything stored, in insertion order.
    pub fn snapshot(&self) -> Vec<R> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }
}

impl<R: Clone + Timestamped> ReadingStore<R> for MemoryStore<R> {
    fn fetch_recent(&self, limit: usize) -> Result<Vec<R>, BoxError> {
        let mut all = self
            .records
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .clone();
        newest_first(&mut all);
        all.truncate(limit);
        Ok(all)
    }

    fn insert(&self, records: &[R]) -> Result<usize, BoxError> {
        let mut guard = self.records.write().map_err(|_| StoreError::Poisoned)?;
        guard.extend_from_slice(records);
        tracing::trace!(inserted = records.len(), total = guard.len(), "memory store insert");
        Ok(records.len())
    }
}
