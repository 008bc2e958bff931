//! Error taxonomy for result ingestion, aggregation and export.

use std::path::PathBuf;

/// Errors produced by the core library.
#[derive(Debug, thiserror::Error)]
pub enum CropsimError {
    #[error("result artifact not found: {0}")]
    ResultNotFound(PathBuf),

    #[error("no daily records parsed from {0}")]
    EmptyResult(PathBuf),

    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("invalid value {value:?} for parameter {key}: expected a number")]
    InvalidParameterValue { key: String, value: String },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CropsimError>;
