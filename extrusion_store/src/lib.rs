#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Reference implementations of the `extrusion_traits` collaborator seams.
//!
//! - `MemoryStore`: process-local reading store, handy for tests and dry runs
//! - `JsonlStore`: append-only JSON-lines file, one record per line
//! - `JsonEquipmentRegistry`: equipment reference data from a JSON array file

pub mod error;
pub mod jsonl;
pub mod memory;
pub mod registry;

pub use error::StoreError;
pub use jsonl::JsonlStore;
pub use memory::MemoryStore;
pub use registry::JsonEquipmentRegistry;

use extrusion_traits::Timestamped;

/// Order newest first; untimestamped records sort last. Among equal
/// timestamps the later-inserted record comes first.
pub(crate) fn newest_first<R: Timestamped>(records: &mut Vec<R>) {
    records.reverse();
    records.sort_by(|a, b| match (a.timestamp(), b.timestamp()) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}
