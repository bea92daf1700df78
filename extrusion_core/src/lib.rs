#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Extrusion-line analytics engine (storage-agnostic).
//!
//! Telemetry readings are JSON documents with nested heating zones and
//! material dosing arrays. The engine annotates them in batches and rates
//! the equipment that produced them. Persistence and equipment reference
//! data go through the `extrusion_traits` seams.
//!
//! ## Architecture
//!
//! - **Readings**: dynamic documents plus typed annotations (`reading`),
//!   addressed through dotted/indexed paths (`accessor`)
//! - **History**: newest-first comparison window and the in-flight buffer of
//!   the current run (`history`)
//! - **Anomaly detection**: z-score and trimmed-MAD with a cold-start regime
//!   and adaptive thresholds (`anomaly`)
//! - **Quality**: tolerance-based deviation scores and Cpk (`quality`)
//! - **Maintenance**: composite health model and risk tiers (`maintenance`)
//! - **Runner**: per-batch orchestration over a `ReadingStore` (`runner`,
//!   built with `builder`)

pub mod accessor;
pub mod anomaly;
pub mod builder;
pub mod config;
pub mod conversions;
pub mod equipment;
pub mod error;
pub mod history;
pub mod maintenance;
pub mod pool;
pub mod quality;
pub mod reading;
pub mod runner;
pub mod stats;
pub mod types;

pub use accessor::FieldPath;
pub use anomaly::{AnomalyDetector, ColdStartRule, Thresholds};
pub use builder::{Missing, RunnerBuilder, Set, build_runner};
pub use config::Settings;
pub use equipment::{Equipment, EquipmentStatus, EquipmentType, MaintenanceEvent, Sensor, SensorType};
pub use error::{AnalyticsError, BuildError, Report, Result};
pub use history::{HistoricalWindow, InFlightBuffer};
pub use maintenance::{MaintenanceAssessment, MaintenancePrediction, MaintenancePredictor, RiskLevel};
pub use quality::QualityScorer;
pub use reading::{AnnotatedReading, AnomalyAnnotation, QualityAnnotation, Reading};
pub use runner::{AnalyticsRunner, BatchReport};
pub use types::{NormalRange, Tolerance};
