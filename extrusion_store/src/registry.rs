//! Equipment registry backed by a JSON array document.

use std::path::Path;

use extrusion_traits::{BoxError, EquipmentRegistry, Identified};
use serde::de::DeserializeOwned;

use crate::error::{Result, StoreError};

/// Read-only registry loaded once from a JSON array.
#[derive(Debug, Clone)]
pub struct JsonEquipmentRegistry<E> {
    units: Vec<E>,
}

impl<E> JsonEquipmentRegistry<E> {
    pub fn new(units: Vec<E>) -> Self {
        Self { units }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl<E: DeserializeOwned> JsonEquipmentRegistry<E> {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let units: Vec<E> = serde_json::from_str(&text).map_err(|source| StoreError::Decode {
            path: path.to_path_buf(),
            line: source.line(),
            source,
        })?;
        tracing::debug!(path = %path.display(), units = units.len(), "equipment registry loaded");
        Ok(Self { units })
    }
}

impl<E: Clone + Identified> EquipmentRegistry<E> for JsonEquipmentRegistry<E> {
    fn fetch_all(&self) -> std::result::Result<Vec<E>, BoxError> {
        Ok(self.units.clone())
    }

    fn fetch_by_id(&self, id: &str) -> std::result::Result<Option<E>, BoxError> {
        Ok(self.units.iter().find(|e| e.id() == id).cloned())
    }
}
