//! Seasonal aggregation over canonical daily records.

use crate::domain::{CanonicalDailyRecord, CanonicalField, SeasonalSummary};
use serde::{Deserialize, Serialize};

/// Derive the seasonal summary for a run.
///
/// Totals treat unset values as zero. Maxima and finals fall back to zero
/// when a variable was never reported. Averages divide by the number of
/// records (ET) or by the number of records reporting a value (canopy).
/// An empty input yields the all-zero summary.
pub fn summarize(records: &[CanonicalDailyRecord]) -> SeasonalSummary {
    if records.is_empty() {
        return SeasonalSummary::default();
    }

    let count = records.len();
    let total_rainfall = total(records, CanonicalField::Rainfall);
    let total_irrigation = total(records, CanonicalField::Irrigation);
    let total_et = total(records, CanonicalField::Et);

    let max_biomass = max_reported(records, CanonicalField::Biomass);
    let max_canopy = max_reported(records, CanonicalField::Canopy);
    let final_biomass = last_reported(records, CanonicalField::Biomass);
    let final_canopy = last_reported(records, CanonicalField::Canopy);
    let final_yield = last_reported(records, CanonicalField::Yield);

    let canopy_values = reported(records, CanonicalField::Canopy);
    let avg_canopy = if canopy_values.is_empty() {
        0.0
    } else {
        canopy_values.iter().sum::<f64>() / canopy_values.len() as f64
    };

    SeasonalSummary {
        simulation_days: count,
        total_rainfall,
        total_irrigation,
        total_et,
        avg_et: total_et / count as f64,
        max_biomass,
        final_biomass,
        max_canopy,
        final_canopy,
        avg_canopy,
        final_yield,
        water_productivity: (total_et > 0.0).then(|| final_yield / total_et),
        harvest_index: (final_yield > 0.0 && final_biomass > 0.0)
            .then(|| final_yield / final_biomass),
        biomass_growth_rate: growth_rate(records, CanonicalField::Biomass),
        canopy_growth_rate: growth_rate(records, CanonicalField::Canopy),
    }
}

fn reported(records: &[CanonicalDailyRecord], field: CanonicalField) -> Vec<f64> {
    records.iter().filter_map(|r| r.get(field)).collect()
}

fn total(records: &[CanonicalDailyRecord], field: CanonicalField) -> f64 {
    records.iter().map(|r| r.get(field).unwrap_or(0.0)).sum()
}

fn max_reported(records: &[CanonicalDailyRecord], field: CanonicalField) -> f64 {
    records
        .iter()
        .filter_map(|r| r.get(field))
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))))
        .unwrap_or(0.0)
}

fn last_reported(records: &[CanonicalDailyRecord], field: CanonicalField) -> f64 {
    records
        .iter()
        .rev()
        .find_map(|r| r.get(field))
        .unwrap_or(0.0)
}

/// `(last - first) / record count`, defined only with at least two records
/// and the value present on both ends.
fn growth_rate(records: &[CanonicalDailyRecord], field: CanonicalField) -> Option<f64> {
    if records.len() < 2 {
        return None;
    }
    let first = records.first()?.get(field)?;
    let last = records.last()?.get(field)?;
    Some((last - first) / records.len() as f64)
}

/// Descriptive statistics for one canonical variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableStats {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

/// Statistics over the records that report `field`; `None` when none do.
pub fn variable_statistics(
    records: &[CanonicalDailyRecord],
    field: CanonicalField,
) -> Option<VariableStats> {
    let values = reported(records, field);
    if values.is_empty() {
        return None;
    }
    let count = values.len();
    let sum: f64 = values.iter().sum();
    let mean = sum / count as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(VariableStats {
        count,
        sum,
        mean,
        std_dev: variance.sqrt(),
        min,
        max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(n: u32) -> CanonicalDailyRecord {
        CanonicalDailyRecord::new(n)
    }

    #[test]
    fn test_empty_input_is_all_zero() {
        let summary = summarize(&[]);
        assert_eq!(summary, SeasonalSummary::default());
        assert_eq!(summary.water_productivity, None);
    }

    #[test]
    fn test_totals_and_finals() {
        let records = vec![
            day(1)
                .with(CanonicalField::Rainfall, 5.0)
                .with(CanonicalField::Et, 2.0)
                .with(CanonicalField::Biomass, 100.0),
            day(2)
                .with(CanonicalField::Rainfall, 0.0)
                .with(CanonicalField::Et, 3.0)
                .with(CanonicalField::Biomass, 150.0),
        ];
        let s = summarize(&records);
        assert_eq!(s.simulation_days, 2);
        assert_eq!(s.total_rainfall, 5.0);
        assert_eq!(s.total_et, 5.0);
        assert_eq!(s.avg_et, 2.5);
        assert_eq!(s.max_biomass, 150.0);
        assert_eq!(s.final_biomass, 150.0);
        assert_eq!(s.biomass_growth_rate, Some(25.0));
        assert_eq!(s.final_yield, 0.0);
        assert_eq!(s.water_productivity, Some(0.0));
        assert_eq!(s.harvest_index, None);
    }

    #[test]
    fn test_final_uses_last_reported_value() {
        let records = vec![
            day(1).with(CanonicalField::Yield, 900.0),
            day(2),
            day(3).with(CanonicalField::Canopy, 40.0),
        ];
        let s = summarize(&records);
        assert_eq!(s.final_yield, 900.0);
        assert_eq!(s.final_canopy, 40.0);
        assert_eq!(s.avg_canopy, 40.0);
    }

    #[test]
    fn test_growth_rate_needs_both_ends() {
        let records = vec![
            day(1),
            day(2).with(CanonicalField::Canopy, 20.0),
            day(3).with(CanonicalField::Canopy, 50.0),
        ];
        assert_eq!(summarize(&records).canopy_growth_rate, None);
        assert_eq!(summarize(&records[1..]).canopy_growth_rate, Some(15.0));
        assert_eq!(summarize(&records[2..]).canopy_growth_rate, None);
    }

    #[test]
    fn test_harvest_index_when_yield_and_biomass_positive() {
        let records = vec![day(1)
            .with(CanonicalField::Biomass, 2000.0)
            .with(CanonicalField::Yield, 900.0)];
        assert_eq!(summarize(&records).harvest_index, Some(0.45));
    }

    #[test]
    fn test_variable_statistics() {
        let records = vec![
            day(1).with(CanonicalField::Et, 2.0),
            day(2),
            day(3).with(CanonicalField::Et, 4.0),
        ];
        let stats = variable_statistics(&records, CanonicalField::Et).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.sum, 6.0);
        assert_eq!(stats.mean, 3.0);
        assert_eq!(stats.std_dev, 1.0);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 4.0);
        assert!(variable_statistics(&records, CanonicalField::Yield).is_none());
    }
}
