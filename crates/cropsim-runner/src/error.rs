//! Errors for case management, guarded execution and sweeps.

use crate::sweep::SweepPoint;
use cropsim_core::CropsimError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("case directory not found: {0}")]
    CaseNotFound(PathBuf),

    #[error("project descriptor not found: {0}")]
    DescriptorNotFound(PathBuf),

    #[error("simulation executable not found: {0}")]
    ExecutableNotFound(String),

    #[error("case directory already exists and is not empty: {0}")]
    AlreadyExists(PathBuf),

    #[error("invalid case name {0:?}: expected a single path component starting with \"case-\"")]
    InvalidCaseName(String),

    #[error("invalid case attribute {key:?}: {reason}")]
    InvalidAttribute { key: String, reason: &'static str },

    #[error("active list is locked by another run: {0}")]
    ActiveListBusy(PathBuf),

    #[error(transparent)]
    Core(#[from] CropsimError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RunnerError>;

/// A sweep that stopped early. The parameter has already been restored;
/// points finished before the failure are kept.
#[derive(Debug, thiserror::Error)]
#[error("sweep of {parameter} stopped after {} completed point(s): {source}", .completed.len())]
pub struct SweepError {
    pub parameter: String,
    pub completed: Vec<SweepPoint>,
    #[source]
    pub source: RunnerError,
}

impl SweepError {
    pub fn new(parameter: impl Into<String>, completed: Vec<SweepPoint>, source: RunnerError) -> Self {
        Self {
            parameter: parameter.into(),
            completed,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_pass_through() {
        let err: RunnerError = CropsimError::UnknownParameter("leaf_area".to_string()).into();
        assert_eq!(err.to_string(), "unknown parameter: leaf_area");
    }

    #[test]
    fn test_sweep_error_reports_progress() {
        let err = SweepError::new(
            "cn",
            Vec::new(),
            RunnerError::ExecutableNotFound("aquacrop".to_string()),
        );
        let msg = err.to_string();
        assert!(msg.contains("sweep of cn"));
        assert!(msg.contains("0 completed"));
        assert!(msg.contains("aquacrop"));
    }
}
