//! Alias-table normalization of raw rows onto canonical fields.

use crate::domain::{CanonicalDailyRecord, CanonicalField, RawRecord, RawValue};

/// Accepted source spellings for the day index, tried in order.
pub const DAY_ALIASES: &[&str] = &["day", "Day", "DAY"];

/// Canonical field to the ordered source spellings it may be read from.
///
/// The unit-tagged export column names are included so exported CSV files
/// ingest back onto the same fields.
pub const ALIAS_TABLE: [(CanonicalField, &[&str]); 7] = [
    (
        CanonicalField::Rainfall,
        &["rain", "Rain", "rainfall", "Rainfall", "rainfall_mm"],
    ),
    (
        CanonicalField::Irrigation,
        &["irrig", "Irrig", "irrigation", "Irrigation", "irrigation_mm"],
    ),
    (
        CanonicalField::Et,
        &["et", "ET", "Et", "transpiration", "Transpiration", "et_mm"],
    ),
    (
        CanonicalField::Biomass,
        &["biomass", "Biomass", "B", "biomass_kg_ha"],
    ),
    (
        CanonicalField::Canopy,
        &["canopy", "Canopy", "CC", "cc", "canopy_pct"],
    ),
    (
        CanonicalField::Yield,
        &["yield", "Yield", "Y", "yield_kg_ha"],
    ),
    (
        CanonicalField::SoilMoisture,
        &["soil_moisture", "SoilMoisture", "soil_moisture_pct"],
    ),
];

/// Source spellings accepted for `field`.
pub fn aliases(field: CanonicalField) -> &'static [&'static str] {
    ALIAS_TABLE
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, names)| *names)
        .unwrap_or(&[])
}

/// First alias present in `record`, if any.
fn first_present<'a>(record: &'a RawRecord, names: &[&str]) -> Option<&'a RawValue> {
    names.iter().find_map(|name| record.get(name))
}

/// Resolve one canonical field.
///
/// The first alias present wins. A present but non-numeric token leaves the
/// field unset; later aliases are not consulted.
pub fn resolve(record: &RawRecord, field: CanonicalField) -> Option<f64> {
    first_present(record, aliases(field)).and_then(RawValue::as_number)
}

/// Day index reported by the row itself, when it is a positive whole number.
pub fn resolve_day(record: &RawRecord) -> Option<u32> {
    let value = first_present(record, DAY_ALIASES)?.as_number()?;
    if value >= 1.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}

/// Normalize a raw row found at 1-based `position` in its artifact.
pub fn normalize(record: &RawRecord, position: u32) -> CanonicalDailyRecord {
    let mut canonical = CanonicalDailyRecord::new(resolve_day(record).unwrap_or(position));
    for (field, _) in ALIAS_TABLE.iter() {
        canonical.set(*field, resolve(record, *field));
    }
    canonical
}
