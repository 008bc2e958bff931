//! Cropsim core library.
//!
//! Turns the text output of an external crop-simulation program into
//! canonical daily records, seasonal summaries and CSV/JSON exports.
//!
//! # Modules
//!
//! - [`domain`]: raw/canonical records, seasonal summary, typed parameter keys
//! - [`ingest`]: format detection, raw row extraction, alias normalization
//! - [`aggregate`]: seasonal summary and per-variable statistics
//! - [`export`]: unit-tagged CSV and JSON writers
//! - [`obs`]: structured lifecycle events
//! - [`telemetry`]: global tracing subscriber setup

pub mod aggregate;
pub mod domain;
pub mod error;
pub mod export;
pub mod ingest;
pub mod obs;
pub mod telemetry;

pub use aggregate::{summarize, variable_statistics, VariableStats};
pub use domain::{
    CanonicalDailyRecord, CanonicalField, ClimateField, CropField, IrrigationField,
    ParameterGroup, ParameterKey, RawRecord, RawValue, SeasonalSummary, SimulationField,
    SoilField, ValueKind,
};
pub use error::{CropsimError, Result};
pub use export::{write_daily_csv, write_json, write_seasonal_csv};
pub use ingest::{ingest, ingest_detailed, ingest_str, render_placeholder, Ingested, ResultFormat};
pub use telemetry::init_tracing;

/// Library version, shared by every crate in the workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
