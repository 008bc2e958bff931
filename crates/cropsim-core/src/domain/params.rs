//! Typed parameter keys over the closed set of case parameter groups.
//!
//! A case stores its parameters as a free-form `key=value` mapping. The keys
//! below are the ones the driver knows how to read and vary; each belongs to
//! exactly one [`ParameterGroup`], has a [`ValueKind`] and a default used when
//! the case file does not mention it.

use crate::error::{CropsimError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Whether a parameter holds a number or free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    Text,
}

/// Parameter groups a case is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterGroup {
    Soil,
    Crop,
    Climate,
    Irrigation,
    Simulation,
}

impl ParameterGroup {
    pub const ALL: [ParameterGroup; 5] = [
        ParameterGroup::Soil,
        ParameterGroup::Crop,
        ParameterGroup::Climate,
        ParameterGroup::Irrigation,
        ParameterGroup::Simulation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ParameterGroup::Soil => "soil",
            ParameterGroup::Crop => "crop",
            ParameterGroup::Climate => "climate",
            ParameterGroup::Irrigation => "irrigation",
            ParameterGroup::Simulation => "simulation",
        }
    }

    fn lookup(&self, name: &str) -> Option<ParameterKey> {
        match self {
            ParameterGroup::Soil => SoilField::from_name(name).map(ParameterKey::Soil),
            ParameterGroup::Crop => CropField::from_name(name).map(ParameterKey::Crop),
            ParameterGroup::Climate => ClimateField::from_name(name).map(ParameterKey::Climate),
            ParameterGroup::Irrigation => {
                IrrigationField::from_name(name).map(ParameterKey::Irrigation)
            }
            ParameterGroup::Simulation => {
                SimulationField::from_name(name).map(ParameterKey::Simulation)
            }
        }
    }
}

macro_rules! parameter_fields {
    ($(#[$meta:meta])* $ty:ident { $($variant:ident => ($key:literal, $kind:ident, $default:literal)),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $ty {
            $($variant),+
        }

        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn name(&self) -> &'static str {
                match self {
                    $($ty::$variant => $key),+
                }
            }

            pub fn kind(&self) -> ValueKind {
                match self {
                    $($ty::$variant => ValueKind::$kind),+
                }
            }

            pub fn default_value(&self) -> &'static str {
                match self {
                    $($ty::$variant => $default),+
                }
            }

            fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($key => Some($ty::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

parameter_fields! {
    /// Soil profile parameters (first layer for layered properties).
    SoilField {
        FieldCapacity => ("field_capacity", Number, "0.32"),
        WiltingPoint => ("wilting_point", Number, "0.15"),
        Saturation => ("saturation", Number, "0.45"),
        CurveNumber => ("cn", Number, "70"),
        Clay => ("clay", Number, "30"),
        Silt => ("silt", Number, "40"),
        Sand => ("sand", Number, "30"),
        OrganicMatter => ("organic_matter", Number, "2.5"),
        BulkDensity => ("bulk_density", Number, "1.3"),
    }
}

parameter_fields! {
    /// Crop development and water-stress parameters.
    CropField {
        HarvestIndex => ("harvest_index", Number, "0.45"),
        CanopyGrowthCoeff => ("canopy_growth_coeff", Number, "0.012"),
        CanopyDeclineCoeff => ("canopy_decline_coeff", Number, "0.003"),
        CycleLength => ("cycle_length", Number, "120"),
        RowSpacing => ("row_spacing", Number, "15"),
        PlantDensity => ("plant_density", Number, "250"),
        KcFactor => ("kc_factor", Number, "1.0"),
        DroughtSensitivity => ("drought_sensitivity", Number, "0.5"),
    }
}

parameter_fields! {
    /// Climate input file names.
    ClimateField {
        TminFile => ("tmin_file", Text, ""),
        TmaxFile => ("tmax_file", Text, ""),
        EtoFile => ("eto_file", Text, ""),
        RainfallFile => ("rainfall_file", Text, ""),
        Co2File => ("co2_file", Text, ""),
    }
}

parameter_fields! {
    IrrigationField {
        Method => ("method", Text, "no_irri"),
        Amount => ("amount", Number, "0"),
        Efficiency => ("efficiency", Number, "1.0"),
    }
}

parameter_fields! {
    SimulationField {
        InitialSwc => ("initial_swc", Number, "0.5"),
        InitialRootDepth => ("initial_root_depth", Number, "0.1"),
        AggregationInterval => ("aggregation_interval", Number, "1"),
        StartDate => ("start_date", Text, ""),
        EndDate => ("end_date", Text, ""),
    }
}

/// A known parameter, tagged with the group it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKey {
    Soil(SoilField),
    Crop(CropField),
    Climate(ClimateField),
    Irrigation(IrrigationField),
    Simulation(SimulationField),
}

impl ParameterKey {
    /// Resolve a parameter name against every group.
    pub fn resolve(name: &str) -> Result<Self> {
        Self::resolve_in(name, &ParameterGroup::ALL)
    }

    /// Resolve a parameter name against the given groups, first match wins.
    pub fn resolve_in(name: &str, groups: &[ParameterGroup]) -> Result<Self> {
        groups
            .iter()
            .find_map(|group| group.lookup(name.trim()))
            .ok_or_else(|| CropsimError::UnknownParameter(name.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ParameterKey::Soil(f) => f.name(),
            ParameterKey::Crop(f) => f.name(),
            ParameterKey::Climate(f) => f.name(),
            ParameterKey::Irrigation(f) => f.name(),
            ParameterKey::Simulation(f) => f.name(),
        }
    }

    pub fn group(&self) -> ParameterGroup {
        match self {
            ParameterKey::Soil(_) => ParameterGroup::Soil,
            ParameterKey::Crop(_) => ParameterGroup::Crop,
            ParameterKey::Climate(_) => ParameterGroup::Climate,
            ParameterKey::Irrigation(_) => ParameterGroup::Irrigation,
            ParameterKey::Simulation(_) => ParameterGroup::Simulation,
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            ParameterKey::Soil(f) => f.kind(),
            ParameterKey::Crop(f) => f.kind(),
            ParameterKey::Climate(f) => f.kind(),
            ParameterKey::Irrigation(f) => f.kind(),
            ParameterKey::Simulation(f) => f.kind(),
        }
    }

    pub fn default_value(&self) -> &'static str {
        match self {
            ParameterKey::Soil(f) => f.default_value(),
            ParameterKey::Crop(f) => f.default_value(),
            ParameterKey::Climate(f) => f.default_value(),
            ParameterKey::Irrigation(f) => f.default_value(),
            ParameterKey::Simulation(f) => f.default_value(),
        }
    }

    /// Current value in `params`, or the default when the key is absent.
    pub fn get<'a>(&self, params: &'a BTreeMap<String, String>) -> &'a str {
        params
            .get(self.name())
            .map(String::as_str)
            .unwrap_or(self.default_value())
    }

    /// Current value parsed as a number.
    pub fn get_number(&self, params: &BTreeMap<String, String>) -> Result<f64> {
        let raw = self.get(params);
        raw.trim()
            .parse::<f64>()
            .map_err(|_| CropsimError::InvalidParameterValue {
                key: self.name().to_string(),
                value: raw.to_string(),
            })
    }

    /// Check that `value` is a single line that fits this key's kind.
    pub fn validate(&self, value: &str) -> Result<()> {
        let multi_line = value.contains(['\n', '\r']);
        let not_numeric =
            self.kind() == ValueKind::Number && value.trim().parse::<f64>().is_err();
        if multi_line || not_numeric {
            return Err(CropsimError::InvalidParameterValue {
                key: self.name().to_string(),
                value: value.to_string(),
            });
        }
        Ok(())
    }

    /// Validate and store `value` under this key.
    pub fn set(&self, params: &mut BTreeMap<String, String>, value: &str) -> Result<()> {
        self.validate(value)?;
        params.insert(self.name().to_string(), value.trim().to_string());
        Ok(())
    }
}

impl FromStr for ParameterKey {
    type Err = CropsimError;

    fn from_str(s: &str) -> Result<Self> {
        Self::resolve(s)
    }
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group().name(), self.name())
    }
}
