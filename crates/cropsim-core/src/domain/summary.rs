//! Seasonal summary model and its unit-tagged views.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate statistics over all daily records of one run.
///
/// Always derived from a record sequence by [`crate::aggregate::summarize`];
/// never edited in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeasonalSummary {
    pub simulation_days: usize,
    pub total_rainfall: f64,
    pub total_irrigation: f64,
    pub total_et: f64,
    pub avg_et: f64,
    pub max_biomass: f64,
    pub final_biomass: f64,
    pub max_canopy: f64,
    pub final_canopy: f64,
    pub avg_canopy: f64,
    pub final_yield: f64,
    /// Yield over total ET; absent when no ET was recorded.
    pub water_productivity: Option<f64>,
    pub harvest_index: Option<f64>,
    pub biomass_growth_rate: Option<f64>,
    pub canopy_growth_rate: Option<f64>,
}

impl SeasonalSummary {
    /// `(key, value, unit)` rows for every defined figure.
    ///
    /// Keys carry their unit as a suffix; optional figures that are not
    /// defined are omitted rather than reported as zero.
    pub fn unit_rows(&self) -> Vec<(&'static str, f64, &'static str)> {
        let mut rows = vec![
            ("simulation_days", self.simulation_days as f64, "days"),
            ("total_rainfall_mm", self.total_rainfall, "mm"),
            ("total_irrigation_mm", self.total_irrigation, "mm"),
            ("total_et_mm", self.total_et, "mm"),
            ("avg_et_mm_day", self.avg_et, "mm/day"),
            ("max_biomass_kg_ha", self.max_biomass, "kg/ha"),
            ("final_biomass_kg_ha", self.final_biomass, "kg/ha"),
            ("max_canopy_pct", self.max_canopy, "%"),
            ("final_canopy_pct", self.final_canopy, "%"),
            ("avg_canopy_pct", self.avg_canopy, "%"),
            ("final_yield_kg_ha", self.final_yield, "kg/ha"),
        ];
        let optional = [
            (
                "water_productivity_kg_ha_mm",
                self.water_productivity,
                "kg/ha/mm",
            ),
            ("harvest_index", self.harvest_index, ""),
            (
                "biomass_growth_rate_kg_ha_day",
                self.biomass_growth_rate,
                "kg/ha/day",
            ),
            (
                "canopy_growth_rate_pct_day",
                self.canopy_growth_rate,
                "%/day",
            ),
        ];
        for (key, value, unit) in optional {
            if let Some(v) = value {
                rows.push((key, v, unit));
            }
        }
        rows
    }

    /// Flat unit-suffixed key to number mapping used by the JSON export.
    pub fn to_unit_map(&self) -> BTreeMap<&'static str, f64> {
        self.unit_rows()
            .into_iter()
            .map(|(key, value, _)| (key, value))
            .collect()
    }
}
