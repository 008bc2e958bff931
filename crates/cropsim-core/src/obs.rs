//! Structured lifecycle events for case runs, sweeps and ingestion.
//!
//! Every event carries an `event` field naming it, so JSON log consumers can
//! filter on a single key.

use std::path::Path;
use tracing::{info, warn};

/// RAII guard entering a case-scoped span for the duration of a run.
///
/// ```ignore
/// let _span = CaseSpan::enter("case-wheat", &run_id);
/// // events logged here carry case and run_id
/// ```
pub struct CaseSpan {
    _span: tracing::span::EnteredSpan,
}

impl CaseSpan {
    pub fn enter(case: &str, run_id: &str) -> Self {
        Self {
            _span: case_span(case, run_id).entered(),
        }
    }
}

/// The case-scoped span itself, for instrumenting futures.
pub fn case_span(case: &str, run_id: &str) -> tracing::Span {
    tracing::info_span!("cropsim.case", case = %case, run_id = %run_id)
}

pub fn emit_case_run_started(case: &str, run_id: &str, executable: &Path) {
    info!(
        event = "case.run_started",
        case = %case,
        run_id = %run_id,
        executable = %executable.display(),
    );
}

/// `exit_code` is absent when the process was killed or never started.
pub fn emit_case_run_finished(
    case: &str,
    run_id: &str,
    duration_ms: u64,
    exit_code: Option<i32>,
    success: bool,
) {
    info!(
        event = "case.run_finished",
        case = %case,
        run_id = %run_id,
        duration_ms = duration_ms,
        exit_code = ?exit_code,
        success = success,
    );
}

pub fn emit_active_list_acquired(path: &Path, entry: &str) {
    info!(event = "active_list.acquired", path = %path.display(), entry = %entry);
}

pub fn emit_active_list_restored(path: &Path, existed: bool) {
    info!(event = "active_list.restored", path = %path.display(), existed = existed);
}

/// A lock left by a driver that exited without restoring was cleared and
/// the list put back from its snapshot.
pub fn emit_active_list_stale_lock_recovered(path: &Path, pid: u32) {
    warn!(event = "active_list.stale_lock_recovered", path = %path.display(), pid = pid);
}

/// Restoration failed; the shared list may still name the wrong case.
pub fn emit_active_list_restore_error(path: &Path, error: &dyn std::fmt::Display) {
    warn!(event = "active_list.restore_error", path = %path.display(), error = %error);
}

pub fn emit_sweep_point_finished(case: &str, parameter: &str, index: usize, value: f64, ok: bool) {
    info!(
        event = "sweep.point_finished",
        case = %case,
        parameter = %parameter,
        index = index,
        value = value,
        ok = ok,
    );
}

pub fn emit_ingest_completed(source: &Path, format: &str, records: usize) {
    info!(
        event = "ingest.completed",
        source = %source.display(),
        format = %format,
        records = records,
    );
}
