//! Driver and run configuration.
//!
//! [`DriverConfig`] describes where things live on disk and is read from
//! `CROPSIM_*` environment variables. [`RunConfig`] is what the orchestrator
//! needs for one invocation and is derived from it.

use crate::error::{Result, RunnerError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default cases directory, relative to the project root.
pub const DEFAULT_CASES_DIR: &str = "PARAM";
/// Default active list location, relative to the project root.
pub const DEFAULT_ACTIVE_LIST: &str = "LIST/ListProjects.txt";
/// Executable locations probed, in order, when none is configured.
pub const EXECUTABLE_CANDIDATES: [&str; 4] = [
    "build/aquacrop_main",
    "build/aquacrop",
    "aquacrop_main",
    "aquacrop",
];

/// How the external program is told which case to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationMode {
    /// No arguments; the program reads the active list.
    ActiveList,
    /// One argument: the case's parameter file.
    ParameterFile,
    /// Do not invoke anything; write a placeholder artifact covering `days`.
    Simulated { days: u32 },
}

/// Filesystem layout and defaults for the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    pub root: PathBuf,
    pub cases_dir: PathBuf,
    pub active_list: PathBuf,
    /// Explicit executable; auto-detected under `root` when absent.
    pub executable: Option<PathBuf>,
    /// Working directory for the program; each case's own directory when
    /// absent.
    pub working_dir: Option<PathBuf>,
    /// Zero disables the timeout.
    pub timeout_secs: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        let root = std::env::var("CROPSIM_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        let mut config = DriverConfig::new(&root);
        if let Ok(dir) = std::env::var("CROPSIM_CASES_DIR") {
            config.cases_dir = PathBuf::from(dir);
        }
        if let Ok(list) = std::env::var("CROPSIM_ACTIVE_LIST") {
            config.active_list = PathBuf::from(list);
        }
        config.executable = std::env::var("CROPSIM_EXECUTABLE").ok().map(PathBuf::from);
        config.working_dir = std::env::var("CROPSIM_WORKDIR").ok().map(PathBuf::from);
        config.timeout_secs = std::env::var("CROPSIM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        config
    }
}

impl DriverConfig {
    /// Read configuration from environment variables.
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Layout rooted at `root` with the conventional sub-paths.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        DriverConfig {
            cases_dir: root.join(DEFAULT_CASES_DIR),
            active_list: root.join(DEFAULT_ACTIVE_LIST),
            root,
            executable: None,
            working_dir: None,
            timeout_secs: 0,
        }
    }

    pub fn with_cases_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cases_dir = dir.into();
        self
    }

    pub fn with_active_list(mut self, path: impl Into<PathBuf>) -> Self {
        self.active_list = path.into();
        self
    }

    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// First existing candidate under `root`, if any.
    pub fn detect_executable(&self) -> Option<PathBuf> {
        EXECUTABLE_CANDIDATES
            .iter()
            .map(|candidate| self.root.join(candidate))
            .find(|path| path.is_file())
    }

    /// Run configuration for `mode`.
    ///
    /// Fails with `ExecutableNotFound` when no executable is configured or
    /// detected, unless the mode is simulated.
    pub fn run_config(&self, mode: InvocationMode) -> Result<RunConfig> {
        let executable = match (&self.executable, mode) {
            (Some(path), _) => path.clone(),
            (None, InvocationMode::Simulated { .. }) => PathBuf::new(),
            (None, _) => self.detect_executable().ok_or_else(|| {
                RunnerError::ExecutableNotFound(format!(
                    "none of {} under {}",
                    EXECUTABLE_CANDIDATES.join(", "),
                    self.root.display()
                ))
            })?,
        };
        Ok(RunConfig {
            executable,
            working_dir: self.working_dir.clone(),
            mode,
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
        })
    }
}

/// Settings for one orchestrated invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub executable: PathBuf,
    /// Working directory for the child; the case root when absent.
    pub working_dir: Option<PathBuf>,
    pub mode: InvocationMode,
    pub timeout: Option<Duration>,
}

impl RunConfig {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        RunConfig {
            executable: executable.into(),
            working_dir: None,
            mode: InvocationMode::ActiveList,
            timeout: None,
        }
    }

    /// Placeholder runs only; nothing is executed.
    pub fn simulated(days: u32) -> Self {
        RunConfig {
            executable: PathBuf::new(),
            working_dir: None,
            mode: InvocationMode::Simulated { days },
            timeout: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_mode(mut self, mode: InvocationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
