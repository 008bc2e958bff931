//! Cropsim runner: drives the external crop-simulation program over cases.
//!
//! # Modules
//!
//! - [`registry`]: discover, create and register cases
//! - [`case`]: one case directory and its parameter file
//! - [`active_list`]: the shared active list and its scoped guard
//! - [`orchestrator`]: guarded, sequential execution of one case
//! - [`batch`]: multi-case runs with a per-case report
//! - [`sweep`]: one-parameter sweeps with restoration
//! - [`config`]: driver layout and run settings

pub mod active_list;
pub mod batch;
pub mod case;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod sweep;

pub use active_list::{ActiveList, ActiveListGuard, ListSnapshot, LockRecord};
pub use batch::{run_batch, BatchEntry, BatchReport};
pub use case::Case;
pub use config::{DriverConfig, InvocationMode, RunConfig};
pub use error::{Result, RunnerError, SweepError};
pub use orchestrator::{locate_executable, Orchestrator, RunResult};
pub use registry::CaseRegistry;
pub use sweep::{run_sweep, ParameterTransaction, PointStatus, SweepPoint};
