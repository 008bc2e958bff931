//! Guarded execution of the external simulation program.

use crate::active_list::ActiveList;
use crate::case::Case;
use crate::config::{InvocationMode, RunConfig};
use crate::error::{Result, RunnerError};
use chrono::{DateTime, Utc};
use cropsim_core::ingest::render_placeholder;
use cropsim_core::obs::{self, CaseSpan};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

/// Outcome of one case run. Produced once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub case: String,
    /// True only when the process exited with status 0.
    pub success: bool,
    /// Absent when the process could not be started, was killed, or was
    /// terminated by a signal.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub output_path: PathBuf,
    pub log_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// SHA-256 of the raw output artifact, when it could be read.
    pub output_sha256: Option<String>,
}

impl RunResult {
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == Some(0)
    }
}

/// Resolve the executable: paths must name an existing file, bare names are
/// searched on `PATH`.
pub fn locate_executable(executable: &Path) -> Result<PathBuf> {
    let not_found = || RunnerError::ExecutableNotFound(executable.display().to_string());
    if executable.as_os_str().is_empty() {
        return Err(not_found());
    }
    if executable.components().count() > 1 || executable.is_absolute() {
        // The child runs from the case directory, so relative paths must be
        // pinned down first.
        return if executable.is_file() {
            fs::canonicalize(executable).map_err(|_| not_found())
        } else {
            Err(not_found())
        };
    }
    let search = std::env::var_os("PATH").ok_or_else(not_found)?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(executable))
        .find(|candidate| candidate.is_file())
        .ok_or_else(not_found)
}

fn sha256_file(path: &Path) -> Option<String> {
    fs::read(path)
        .ok()
        .map(|bytes| hex::encode(Sha256::digest(&bytes)))
}

fn append_log(path: &Path, line: &str) {
    let written = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| writeln!(file, "{line}"));
    if let Err(e) = written {
        warn!(log = %path.display(), error = %e, "could not append to run log");
    }
}

/// How the child ended.
struct Exit {
    code: Option<i32>,
    success: bool,
    timed_out: bool,
}

impl Exit {
    fn failed() -> Self {
        Exit {
            code: None,
            success: false,
            timed_out: false,
        }
    }
}

/// Runs cases one at a time against a shared active list.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    active_list: ActiveList,
    config: RunConfig,
}

impl Orchestrator {
    pub fn new(active_list: ActiveList, config: RunConfig) -> Self {
        Self {
            active_list,
            config,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn active_list(&self) -> &ActiveList {
        &self.active_list
    }

    /// Check that a run could start, without touching anything.
    pub fn preflight(&self) -> Result<()> {
        match self.config.mode {
            InvocationMode::Simulated { .. } => Ok(()),
            _ => locate_executable(&self.config.executable).map(|_| ()),
        }
    }

    /// Run `case` inside the active-list critical section.
    ///
    /// Stdout goes to `output/result.txt` and stderr to `output/run.log`.
    /// Non-zero exits, launch errors and timeouts come back as a failed
    /// [`RunResult`]; `Err` is reserved for problems that prevent the run or
    /// the restore, and the list is restored before any of them surfaces.
    pub async fn run_case(&self, case: &Case) -> Result<RunResult> {
        if let InvocationMode::Simulated { days } = self.config.mode {
            return self.simulate_case(case, days);
        }
        let executable = locate_executable(&self.config.executable)?;
        let run_id = Uuid::new_v4().to_string();
        self.run_guarded(case, &executable, &run_id)
            .instrument(obs::case_span(&case.name, &run_id))
            .await
    }

    async fn run_guarded(&self, case: &Case, executable: &Path, run_id: &str) -> Result<RunResult> {
        let started_at = Utc::now();
        let start = Instant::now();
        obs::emit_case_run_started(&case.name, run_id, executable);

        let guard = self.active_list.acquire_exclusive(&case.list_entry())?;
        fs::create_dir_all(case.output_dir())?;
        let stdout = File::create(case.result_path())?;
        let stderr = File::create(case.log_path())?;
        let exit = self.invoke(case, executable, stdout, stderr).await;
        guard.release()?;

        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_case_run_finished(&case.name, run_id, duration_ms, exit.code, exit.success);

        Ok(RunResult {
            run_id: run_id.to_string(),
            case: case.name.clone(),
            success: exit.success,
            exit_code: exit.code,
            timed_out: exit.timed_out,
            output_path: case.result_path(),
            log_path: case.log_path(),
            started_at,
            finished_at: Utc::now(),
            duration_ms,
            output_sha256: sha256_file(&case.result_path()),
        })
    }

    async fn invoke(&self, case: &Case, executable: &Path, stdout: File, stderr: File) -> Exit {
        let working_dir = self.config.working_dir.as_deref().unwrap_or(&case.root);
        let mut command = Command::new(executable);
        command
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);
        if self.config.mode == InvocationMode::ParameterFile {
            let param_file = case.param_file();
            command.arg(fs::canonicalize(&param_file).unwrap_or(param_file));
        }
        debug!(
            executable = %executable.display(),
            cwd = %working_dir.display(),
            "spawning simulation"
        );

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                append_log(&case.log_path(), &format!("Error during execution: {e}"));
                return Exit::failed();
            }
        };

        let waited = match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        warn!(case = %case.name, error = %e, "failed to kill timed-out run");
                    }
                    append_log(
                        &case.log_path(),
                        &format!(
                            "Error during execution: timed out after {} seconds; process killed",
                            limit.as_secs()
                        ),
                    );
                    return Exit {
                        timed_out: true,
                        ..Exit::failed()
                    };
                }
            },
            None => child.wait().await,
        };

        match waited {
            Ok(status) => Exit {
                code: status.code(),
                success: status.success(),
                timed_out: false,
            },
            Err(e) => {
                append_log(&case.log_path(), &format!("Error during execution: {e}"));
                Exit::failed()
            }
        }
    }

    /// Write a deterministic placeholder artifact instead of running anything.
    /// The active list is left alone.
    pub fn simulate_case(&self, case: &Case, days: u32) -> Result<RunResult> {
        let run_id = Uuid::new_v4().to_string();
        let _span = CaseSpan::enter(&case.name, &run_id);
        let started_at = Utc::now();
        let start = Instant::now();

        fs::create_dir_all(case.output_dir())?;
        fs::write(case.result_path(), render_placeholder(days))?;
        fs::write(
            case.log_path(),
            format!("Simulated {days} day(s) for {}\n", case.name),
        )?;

        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_case_run_finished(&case.name, &run_id, duration_ms, Some(0), true);
        Ok(RunResult {
            run_id,
            case: case.name.clone(),
            success: true,
            exit_code: Some(0),
            timed_out: false,
            output_path: case.result_path(),
            log_path: case.log_path(),
            started_at,
            finished_at: Utc::now(),
            duration_ms,
            output_sha256: sha256_file(&case.result_path()),
        })
    }
}
