//! CSV and JSON exports of daily records and seasonal summaries.
//!
//! Column and key names are unit-tagged (`et_mm`, `total_rainfall_mm`); values
//! are written in their native `f64` representation with no conversion.

use crate::domain::{CanonicalDailyRecord, CanonicalField, SeasonalSummary};
use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Header row of the daily CSV export.
pub fn daily_header() -> Vec<&'static str> {
    std::iter::once("day")
        .chain(CanonicalField::ALL.iter().map(|f| f.column()))
        .collect()
}

fn format_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write daily records as CSV to any writer. Unset values become empty cells.
pub fn write_daily_csv_to<W: Write>(writer: W, records: &[CanonicalDailyRecord]) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(daily_header())?;
    for record in records {
        let mut row = Vec::with_capacity(CanonicalField::ALL.len() + 1);
        row.push(record.day.to_string());
        row.extend(CanonicalField::ALL.iter().map(|f| format_value(record.get(*f))));
        out.write_record(&row)?;
    }
    out.flush()?;
    Ok(())
}

/// Write daily records to a CSV file at `path`.
pub fn write_daily_csv(path: &Path, records: &[CanonicalDailyRecord]) -> Result<()> {
    write_daily_csv_to(BufWriter::new(File::create(path)?), records)?;
    debug!(path = %path.display(), rows = records.len(), "wrote daily csv");
    Ok(())
}

/// Write the seasonal summary as `parameter,value,unit` rows.
pub fn write_seasonal_csv_to<W: Write>(writer: W, summary: &SeasonalSummary) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(["parameter", "value", "unit"])?;
    for (key, value, unit) in summary.unit_rows() {
        out.write_record([key, value.to_string().as_str(), unit])?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_seasonal_csv(path: &Path, summary: &SeasonalSummary) -> Result<()> {
    write_seasonal_csv_to(BufWriter::new(File::create(path)?), summary)?;
    debug!(path = %path.display(), "wrote seasonal csv");
    Ok(())
}

/// Shape of the JSON export document.
#[derive(Debug, Serialize)]
pub struct ExportDocument<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case: Option<&'a str>,
    pub seasonal: BTreeMap<&'static str, f64>,
    pub daily: &'a [CanonicalDailyRecord],
}

impl<'a> ExportDocument<'a> {
    pub fn new(
        case: Option<&'a str>,
        summary: &SeasonalSummary,
        records: &'a [CanonicalDailyRecord],
    ) -> Self {
        Self {
            case,
            seasonal: summary.to_unit_map(),
            daily: records,
        }
    }
}

/// Write `{case?, seasonal, daily}` as pretty-printed JSON to any writer.
pub fn write_json_to<W: Write>(
    mut writer: W,
    case: Option<&str>,
    summary: &SeasonalSummary,
    records: &[CanonicalDailyRecord],
) -> Result<()> {
    let doc = ExportDocument::new(case, summary, records);
    serde_json::to_writer_pretty(&mut writer, &doc)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

pub fn write_json(
    path: &Path,
    case: Option<&str>,
    summary: &SeasonalSummary,
    records: &[CanonicalDailyRecord],
) -> Result<()> {
    write_json_to(BufWriter::new(File::create(path)?), case, summary, records)?;
    debug!(path = %path.display(), rows = records.len(), "wrote json export");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::summarize;

    fn sample() -> Vec<CanonicalDailyRecord> {
        vec![
            CanonicalDailyRecord::new(1)
                .with(CanonicalField::Rainfall, 4.5)
                .with(CanonicalField::Biomass, 100.0),
            CanonicalDailyRecord::new(2).with(CanonicalField::Et, 2.25),
        ]
    }

    #[test]
    fn test_daily_csv_layout() {
        let mut buf = Vec::new();
        write_daily_csv_to(&mut buf, &sample()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "day,rainfall_mm,irrigation_mm,et_mm,biomass_kg_ha,canopy_pct,yield_kg_ha,soil_moisture_pct"
        );
        assert_eq!(lines[1], "1,4.5,,,100,,,");
        assert_eq!(lines[2], "2,,,2.25,,,,");
    }

    #[test]
    fn test_seasonal_csv_rows_have_units() {
        let mut buf = Vec::new();
        write_seasonal_csv_to(&mut buf, &summarize(&sample())).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("parameter,value,unit\n"));
        assert!(text.contains("total_rainfall_mm,4.5,mm\n"));
        assert!(text.contains("simulation_days,2,days\n"));
    }

    #[test]
    fn test_json_document_shape() {
        let records = sample();
        let mut buf = Vec::new();
        write_json_to(&mut buf, Some("case-a"), &summarize(&records), &records).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["case"], "case-a");
        assert_eq!(value["seasonal"]["total_et_mm"], 2.25);
        assert_eq!(value["daily"].as_array().unwrap().len(), 2);
        assert_eq!(value["daily"][0]["rainfall_mm"], 4.5);
        assert!(value["daily"][1]["rainfall_mm"].is_null());
    }

    #[test]
    fn test_json_omits_case_when_absent() {
        let mut buf = Vec::new();
        write_json_to(&mut buf, None, &SeasonalSummary::default(), &[]).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert!(value.get("case").is_none());
        assert!(value["daily"].as_array().unwrap().is_empty());
    }
}
