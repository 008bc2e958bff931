//! Sequential multi-case runs with a per-case report.

use crate::case::Case;
use crate::error::Result;
use crate::orchestrator::{Orchestrator, RunResult};
use chrono::{DateTime, Utc};
use cropsim_core::aggregate::summarize;
use cropsim_core::domain::SeasonalSummary;
use cropsim_core::ingest::ingest;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use tracing::{info, warn};

/// One attempted case. Always present in the report, whatever happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub case: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<RunResult>,
    /// Seasonal summary of a successful run whose output could be ingested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SeasonalSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.success).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.entries.iter().all(|e| e.success)
    }

    /// Human-readable summary: totals, then one line per case.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Total cases: {}", self.total());
        let _ = writeln!(out, "Successful: {}", self.succeeded());
        let _ = writeln!(out, "Failed: {}", self.failed());
        for entry in &self.entries {
            let status = if entry.success { "OK" } else { "FAILED" };
            let _ = write!(out, "  [{status}] {}", entry.case);
            if let Some(code) = entry.run.as_ref().and_then(|r| r.exit_code) {
                let _ = write!(out, " (exit {code})");
            }
            if let Some(error) = &entry.error {
                let _ = write!(out, ": {error}");
            }
            out.push('\n');
        }
        out
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text + "\n")?;
        Ok(())
    }
}

/// Run every case in order. A failure or error on one case is recorded and
/// the batch moves on to the next.
pub async fn run_batch(orchestrator: &Orchestrator, cases: &[Case]) -> BatchReport {
    let started_at = Utc::now();
    let mut entries = Vec::with_capacity(cases.len());

    for case in cases {
        let entry = match orchestrator.run_case(case).await {
            Ok(run) => {
                let mut error = None;
                let summary = if run.success {
                    match ingest(&run.output_path) {
                        Ok(records) => Some(summarize(&records)),
                        Err(e) => {
                            warn!(case = %case.name, error = %e, "run succeeded but output was not ingested");
                            error = Some(e.to_string());
                            None
                        }
                    }
                } else {
                    error = Some(match run.exit_code {
                        Some(code) => format!("exited with status {code}"),
                        None if run.timed_out => "timed out".to_string(),
                        None => format!("did not complete; see {}", run.log_path.display()),
                    });
                    None
                };
                BatchEntry {
                    case: case.name.clone(),
                    success: run.success,
                    run: Some(run),
                    summary,
                    error,
                }
            }
            Err(e) => {
                warn!(case = %case.name, error = %e, "case could not be run");
                BatchEntry {
                    case: case.name.clone(),
                    success: false,
                    run: None,
                    summary: None,
                    error: Some(e.to_string()),
                }
            }
        };
        entries.push(entry);
    }

    let report = BatchReport {
        started_at,
        finished_at: Utc::now(),
        entries,
    };
    info!(
        total = report.total(),
        succeeded = report.succeeded(),
        failed = report.failed(),
        "batch finished"
    );
    report
}
