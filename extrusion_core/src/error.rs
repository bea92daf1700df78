use thiserror::Error;

/// Domain failures of the analytics core.
///
/// Per-record variants (`MalformedReading`, `NumericFault`) never abort a
/// batch: the batch operations demote the record to a neutral annotation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalyticsError {
    #[error("invalid batch: {0}")]
    InvalidBatch(String),
    #[error("malformed reading: {0}")]
    MalformedReading(String),
    #[error("non-finite result while scoring parameter '{parameter}'")]
    NumericFault { parameter: String },
    #[error("invalid field path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },
    #[error("history unavailable: {0}")]
    History(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing reading store")]
    MissingStore,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
