//! Domain models for crop-simulation results.
//!
//! - `RawRecord` / `RawValue`: one schema-free row of simulator output
//! - `CanonicalDailyRecord`: a day normalized onto known variables
//! - `SeasonalSummary`: statistics derived from a run's daily records
//! - `ParameterKey`: typed access to a case's parameter groups

pub mod params;
pub mod record;
pub mod summary;

pub use params::{
    ClimateField, CropField, IrrigationField, ParameterGroup, ParameterKey, SimulationField,
    SoilField, ValueKind,
};
pub use record::{CanonicalDailyRecord, CanonicalField, RawRecord, RawValue};
pub use summary::SeasonalSummary;
