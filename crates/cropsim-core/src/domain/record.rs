//! Raw and canonical daily records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One token from the simulator's output, converted opportunistically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    /// Parse a token as a number, keeping it as text when that fails.
    pub fn parse(token: &str) -> Self {
        let trimmed = token.trim();
        match trimmed.parse::<f64>() {
            Ok(n) => RawValue::Number(n),
            Err(_) => RawValue::Text(trimmed.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawValue::Number(n) => Some(*n),
            RawValue::Text(_) => None,
        }
    }
}

/// One row of simulator output keyed by whatever column names it used.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: BTreeMap<String, RawValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zip header names with row tokens.
    ///
    /// Missing trailing tokens leave the column absent; surplus tokens are
    /// dropped.
    pub fn from_row<H, T>(headers: &[H], tokens: &[T]) -> Self
    where
        H: AsRef<str>,
        T: AsRef<str>,
    {
        let mut record = Self::new();
        for (header, token) in headers.iter().zip(tokens.iter()) {
            record.insert(header.as_ref().trim(), RawValue::parse(token.as_ref()));
        }
        record
    }

    pub fn insert(&mut self, key: impl Into<String>, value: RawValue) {
        self.fields.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.fields.get(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// Variables every result format is normalized onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Rainfall,
    Irrigation,
    Et,
    Biomass,
    Canopy,
    Yield,
    SoilMoisture,
}

impl CanonicalField {
    /// All fields in export column order.
    pub const ALL: [CanonicalField; 7] = [
        CanonicalField::Rainfall,
        CanonicalField::Irrigation,
        CanonicalField::Et,
        CanonicalField::Biomass,
        CanonicalField::Canopy,
        CanonicalField::Yield,
        CanonicalField::SoilMoisture,
    ];

    /// Unit-tagged column name used in CSV and JSON exports.
    pub fn column(&self) -> &'static str {
        match self {
            CanonicalField::Rainfall => "rainfall_mm",
            CanonicalField::Irrigation => "irrigation_mm",
            CanonicalField::Et => "et_mm",
            CanonicalField::Biomass => "biomass_kg_ha",
            CanonicalField::Canopy => "canopy_pct",
            CanonicalField::Yield => "yield_kg_ha",
            CanonicalField::SoilMoisture => "soil_moisture_pct",
        }
    }
}

/// A daily result normalized to a fixed set of optional fields.
///
/// Unset means "not reported", which aggregation keeps distinct from an
/// observed zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDailyRecord {
    pub day: u32,
    pub rainfall_mm: Option<f64>,
    pub irrigation_mm: Option<f64>,
    pub et_mm: Option<f64>,
    pub biomass_kg_ha: Option<f64>,
    pub canopy_pct: Option<f64>,
    pub yield_kg_ha: Option<f64>,
    pub soil_moisture_pct: Option<f64>,
}

impl CanonicalDailyRecord {
    pub fn new(day: u32) -> Self {
        Self {
            day,
            ..Self::default()
        }
    }

    pub fn get(&self, field: CanonicalField) -> Option<f64> {
        match field {
            CanonicalField::Rainfall => self.rainfall_mm,
            CanonicalField::Irrigation => self.irrigation_mm,
            CanonicalField::Et => self.et_mm,
            CanonicalField::Biomass => self.biomass_kg_ha,
            CanonicalField::Canopy => self.canopy_pct,
            CanonicalField::Yield => self.yield_kg_ha,
            CanonicalField::SoilMoisture => self.soil_moisture_pct,
        }
    }

    pub fn set(&mut self, field: CanonicalField, value: Option<f64>) {
        let slot = match field {
            CanonicalField::Rainfall => &mut self.rainfall_mm,
            CanonicalField::Irrigation => &mut self.irrigation_mm,
            CanonicalField::Et => &mut self.et_mm,
            CanonicalField::Biomass => &mut self.biomass_kg_ha,
            CanonicalField::Canopy => &mut self.canopy_pct,
            CanonicalField::Yield => &mut self.yield_kg_ha,
            CanonicalField::SoilMoisture => &mut self.soil_moisture_pct,
        };
        *slot = value;
    }

    /// Builder-style setter, mostly for tests and fixtures.
    pub fn with(mut self, field: CanonicalField, value: f64) -> Self {
        self.set(field, Some(value));
        self
    }
}
