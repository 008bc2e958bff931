//! One-parameter sweeps over a case, with guaranteed restoration.
//!
//! The varied parameter is held by a [`ParameterTransaction`]: it captures the
//! stored value when it begins and puts it back when it ends, whether the
//! loop finished, returned an error or unwound.

use crate::case::Case;
use crate::error::{Result, RunnerError, SweepError};
use crate::orchestrator::{Orchestrator, RunResult};
use cropsim_core::aggregate::summarize;
use cropsim_core::domain::{CanonicalDailyRecord, ParameterGroup, ParameterKey, SeasonalSummary};
use cropsim_core::export::{write_daily_csv, write_json};
use cropsim_core::ingest::ingest;
use cropsim_core::{obs, CropsimError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Groups a sweep may vary.
pub const SWEEPABLE_GROUPS: [ParameterGroup; 2] = [ParameterGroup::Soil, ParameterGroup::Crop];

/// How a sweep point turned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointStatus {
    Ok,
    /// The run exited unsuccessfully; the summary covers whatever output
    /// it left behind.
    RunFailed,
    /// The run succeeded but produced no daily records.
    EmptyResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub index: usize,
    pub value: f64,
    pub status: PointStatus,
    pub run: RunResult,
    pub summary: SeasonalSummary,
    /// Export files written for this point.
    pub exports: Vec<PathBuf>,
}

/// Scoped change to one case parameter.
pub struct ParameterTransaction<'a> {
    case: &'a mut Case,
    key: ParameterKey,
    original: Option<String>,
    finished: bool,
}

impl<'a> ParameterTransaction<'a> {
    pub fn begin(case: &'a mut Case, key: ParameterKey) -> Self {
        let original = case.raw_parameter(key.name()).map(str::to_string);
        Self {
            case,
            key,
            original,
            finished: false,
        }
    }

    /// Raw value captured at `begin`; `None` when the file did not set it.
    pub fn original(&self) -> Option<&str> {
        self.original.as_deref()
    }

    pub fn case(&self) -> &Case {
        &*self.case
    }

    pub fn apply(&mut self, value: &str) -> Result<()> {
        self.case.set_parameter(self.key, value)
    }

    /// Restore the captured value and end the transaction.
    pub fn restore(mut self) -> Result<()> {
        self.finished = true;
        self.case
            .restore_parameter(self.key.name(), self.original.as_deref())
    }
}

impl Drop for ParameterTransaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self
            .case
            .restore_parameter(self.key.name(), self.original.as_deref())
        {
            warn!(
                case = %self.case.name,
                parameter = %self.key,
                error = %e,
                "failed to restore swept parameter"
            );
        }
    }
}

/// Export paths for point `index`: `<prefix>_<index>.csv` and `.json`.
pub fn export_paths(prefix: &Path, index: usize) -> (PathBuf, PathBuf) {
    let with_suffix = |ext: &str| {
        let mut name = prefix.as_os_str().to_owned();
        name.push(format!("_{index}.{ext}"));
        PathBuf::from(name)
    };
    (with_suffix("csv"), with_suffix("json"))
}

fn export_point(
    prefix: &Path,
    index: usize,
    case: &str,
    summary: &SeasonalSummary,
    records: &[CanonicalDailyRecord],
) -> Result<Vec<PathBuf>> {
    let (csv, json) = export_paths(prefix, index);
    if let Some(parent) = csv.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_daily_csv(&csv, records)?;
    write_json(&json, Some(case), summary, records)?;
    Ok(vec![csv, json])
}

async fn run_point(
    orchestrator: &Orchestrator,
    txn: &mut ParameterTransaction<'_>,
    index: usize,
    value: f64,
    export_prefix: Option<&Path>,
) -> Result<SweepPoint> {
    txn.apply(&value.to_string())?;
    let case = txn.case();
    let run = orchestrator.run_case(case).await?;

    let records = match ingest(&run.output_path) {
        Ok(records) => records,
        Err(CropsimError::EmptyResult(_)) | Err(CropsimError::ResultNotFound(_)) => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    let status = if !run.success {
        PointStatus::RunFailed
    } else if records.is_empty() {
        PointStatus::EmptyResult
    } else {
        PointStatus::Ok
    };
    let summary = summarize(&records);
    let exports = match export_prefix {
        Some(prefix) => export_point(prefix, index, &case.name, &summary, &records)?,
        None => Vec::new(),
    };

    Ok(SweepPoint {
        index,
        value,
        status,
        run,
        summary,
        exports,
    })
}

/// Run `case` once per value of `parameter`, in the order given.
///
/// `parameter` must name a soil or crop parameter, otherwise this fails with
/// `UnknownParameter` before any run. A point whose run fails or yields no
/// records is kept with that status and the sweep continues. Any other error
/// stops the sweep; the points finished so far come back inside the
/// [`SweepError`]. The parameter is restored in every case.
pub async fn run_sweep(
    orchestrator: &Orchestrator,
    case: &mut Case,
    parameter: &str,
    values: &[f64],
    export_prefix: Option<&Path>,
) -> std::result::Result<Vec<SweepPoint>, SweepError> {
    let key = ParameterKey::resolve_in(parameter, &SWEEPABLE_GROUPS)
        .map_err(|e| SweepError::new(parameter, Vec::new(), e.into()))?;
    orchestrator
        .preflight()
        .map_err(|e| SweepError::new(parameter, Vec::new(), e))?;

    let mut txn = ParameterTransaction::begin(case, key);
    info!(
        case = %txn.case().name,
        parameter = %key,
        original = ?txn.original(),
        points = values.len(),
        "starting sweep"
    );

    let mut points = Vec::with_capacity(values.len());
    let mut failure: Option<RunnerError> = None;
    for (index, value) in values.iter().copied().enumerate() {
        match run_point(orchestrator, &mut txn, index, value, export_prefix).await {
            Ok(point) => {
                obs::emit_sweep_point_finished(
                    &txn.case().name,
                    key.name(),
                    index,
                    value,
                    point.status == PointStatus::Ok,
                );
                points.push(point);
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    let restored = txn.restore();
    match (failure, restored) {
        (Some(e), restored) => {
            if let Err(restore_err) = restored {
                warn!(parameter = %key, error = %restore_err, "restore failed after sweep error");
            }
            Err(SweepError::new(parameter, points, e))
        }
        (None, Err(e)) => Err(SweepError::new(parameter, points, e)),
        (None, Ok(())) => Ok(points),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cropsim_core::domain::SoilField;
    use std::fs;

    fn open_case(dir: &Path, params: &str) -> Case {
        let root = dir.join("case-sweep");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("params.txt"), params).unwrap();
        Case::open(root).unwrap()
    }

    #[test]
    fn test_export_paths_append_index() {
        let (csv, json) = export_paths(Path::new("out/fc.v1"), 2);
        assert_eq!(csv, PathBuf::from("out/fc.v1_2.csv"));
        assert_eq!(json, PathBuf::from("out/fc.v1_2.json"));
    }

    #[test]
    fn test_transaction_restores_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let mut case = open_case(dir.path(), "field_capacity=0.32\n");
        let key = ParameterKey::Soil(SoilField::FieldCapacity);
        {
            let mut txn = ParameterTransaction::begin(&mut case, key);
            txn.apply("0.40").unwrap();
            assert_eq!(txn.case().raw_parameter("field_capacity"), Some("0.40"));
        }
        assert_eq!(case.raw_parameter("field_capacity"), Some("0.32"));
        let on_disk = Case::open(&case.root).unwrap();
        assert_eq!(on_disk.raw_parameter("field_capacity"), Some("0.32"));
    }

    #[test]
    fn test_transaction_removes_key_that_was_absent() {
        let dir = tempfile::tempdir().unwrap();
        let mut case = open_case(dir.path(), "# empty\n");
        let key = ParameterKey::Soil(SoilField::CurveNumber);
        let mut txn = ParameterTransaction::begin(&mut case, key);
        assert_eq!(txn.original(), None);
        txn.apply("80").unwrap();
        txn.restore().unwrap();
        assert_eq!(case.raw_parameter("cn"), None);
        assert_eq!(case.parameter(key), "70");
    }
}
