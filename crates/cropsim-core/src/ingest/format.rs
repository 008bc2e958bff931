//! Structural format detection and raw row extraction.

use crate::domain::{RawRecord, RawValue};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::OnceLock;
use tracing::warn;

/// Banner that identifies the synthetic placeholder output.
pub const PLACEHOLDER_MARKER: &str = "SIMULATED AquaCrop run (placeholder)";

const PLACEHOLDER_LINE: &str = r"Day (\d+): biomass=([\d.]+), canopy=([\d.]+), transpiration=([\d.]+), soil_moisture=([\d.]+)";

/// Column names the placeholder captures are recorded under.
const PLACEHOLDER_COLUMNS: [&str; 5] = [
    "day",
    "biomass",
    "canopy",
    "transpiration",
    "soil_moisture",
];

/// Structural layout of a result artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultFormat {
    /// `Day <n>: biomass=.., canopy=.., transpiration=.., soil_moisture=..` lines.
    Placeholder,
    /// Header row plus comma-separated rows.
    CommaDelimited,
    /// Header row plus whitespace-separated rows.
    WhitespaceDelimited,
}

impl ResultFormat {
    pub fn name(&self) -> &'static str {
        match self {
            ResultFormat::Placeholder => "placeholder",
            ResultFormat::CommaDelimited => "comma_delimited",
            ResultFormat::WhitespaceDelimited => "whitespace_delimited",
        }
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(PLACEHOLDER_LINE).expect("placeholder pattern is valid"))
}

/// Non-blank lines with surrounding whitespace removed.
fn content_lines(content: &str) -> Vec<&str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Decide how `content` should be read.
///
/// The placeholder marker takes priority; otherwise a comma on the second
/// non-blank line selects comma-delimited parsing.
pub fn detect_format(content: &str) -> ResultFormat {
    if content.contains(PLACEHOLDER_MARKER) {
        return ResultFormat::Placeholder;
    }
    match content_lines(content).get(1) {
        Some(line) if line.contains(',') => ResultFormat::CommaDelimited,
        _ => ResultFormat::WhitespaceDelimited,
    }
}

/// Extract raw rows in file order. Never fails; unreadable rows are skipped.
pub fn parse_raw(content: &str) -> (ResultFormat, Vec<RawRecord>) {
    let format = detect_format(content);
    let rows = match format {
        ResultFormat::Placeholder => parse_placeholder(content),
        ResultFormat::CommaDelimited => parse_comma_delimited(&content_lines(content)),
        ResultFormat::WhitespaceDelimited => parse_whitespace_delimited(&content_lines(content)),
    };
    (format, rows)
}

fn parse_placeholder(content: &str) -> Vec<RawRecord> {
    content
        .lines()
        .filter_map(|line| placeholder_pattern().captures(line))
        .map(|caps| {
            let mut record = RawRecord::new();
            for (i, column) in PLACEHOLDER_COLUMNS.iter().enumerate() {
                if let Some(m) = caps.get(i + 1) {
                    record.insert(*column, RawValue::parse(m.as_str()));
                }
            }
            record
        })
        .collect()
}

fn parse_comma_delimited(lines: &[&str]) -> Vec<RawRecord> {
    if lines.len() < 2 {
        return Vec::new();
    }
    let text = lines.join("\n");
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = match reader.headers() {
        Ok(h) => h.iter().map(str::to_string).collect(),
        Err(e) => {
            warn!(error = %e, "unreadable header row in comma-delimited result");
            return Vec::new();
        }
    };

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        match result {
            Ok(record) => {
                let tokens: Vec<&str> = record.iter().collect();
                rows.push(RawRecord::from_row(&headers, &tokens));
            }
            Err(e) => warn!(row = idx + 1, error = %e, "skipping unreadable result row"),
        }
    }
    rows
}

fn parse_whitespace_delimited(lines: &[&str]) -> Vec<RawRecord> {
    let Some((header, body)) = lines.split_first() else {
        return Vec::new();
    };
    let headers: Vec<&str> = header.split_whitespace().collect();
    body.iter()
        .map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            RawRecord::from_row(&headers, &tokens)
        })
        .collect()
}

/// Render a deterministic placeholder artifact covering `days` days.
pub fn render_placeholder(days: u32) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", PLACEHOLDER_MARKER);
    let _ = writeln!(out, "Days: {days}");
    out.push('\n');
    out.push_str("Day biomass(kg/ha) canopy(%) transpiration(mm) soil_moisture(%)\n");
    for day in 1..=days {
        let d = f64::from(day);
        let biomass = 100.0 + d * 15.0;
        let canopy = (d * 4.5).min(100.0);
        let transpiration = 0.8 + d * 0.6;
        let soil_moisture = 25.0 + d * 0.7;
        let _ = writeln!(
            out,
            "Day {day}: biomass={biomass:.1}, canopy={canopy:.1}, transpiration={transpiration:.2}, soil_moisture={soil_moisture:.1}"
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_takes_priority_over_commas() {
        let content = format!("{}\na,b\nc,d\n", PLACEHOLDER_MARKER);
        assert_eq!(detect_format(&content), ResultFormat::Placeholder);
    }

    #[test]
    fn test_second_line_comma_selects_comma_format() {
        assert_eq!(
            detect_format("Day Rain\n1,2\n"),
            ResultFormat::CommaDelimited
        );
        assert_eq!(
            detect_format("Day,Rain\n1 2\n"),
            ResultFormat::WhitespaceDelimited
        );
    }

    #[test]
    fn test_blank_lines_do_not_count_as_second_line() {
        assert_eq!(
            detect_format("\n\nDay,Rain\n\n1,2\n"),
            ResultFormat::CommaDelimited
        );
    }

    #[test]
    fn test_placeholder_ignores_banner_and_header() {
        let (format, rows) = parse_raw(&render_placeholder(4));
        assert_eq!(format, ResultFormat::Placeholder);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].get("day"), Some(&RawValue::Number(1.0)));
        assert_eq!(rows[3].get("biomass"), Some(&RawValue::Number(160.0)));
    }

    #[test]
    fn test_whitespace_rows_keep_text_tokens() {
        let (_, rows) = parse_raw("Day Date ET\n1 2024-05-01 3.5\n2 2024-05-02 x\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].get("Date"),
            Some(&RawValue::Text("2024-05-01".to_string()))
        );
        assert_eq!(rows[1].get("ET"), Some(&RawValue::Text("x".to_string())));
    }

    #[test]
    fn test_comma_rows_trim_and_tolerate_ragged_lines() {
        let (_, rows) = parse_raw("Day, Rain ,ET\n1, 2.0 ,3\n2,4\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Rain"), Some(&RawValue::Number(2.0)));
        assert!(rows[1].get("ET").is_none());
    }

    #[test]
    fn test_header_only_yields_no_rows() {
        assert!(parse_raw("Day Rain ET\n").1.is_empty());
        assert!(parse_raw("").1.is_empty());
    }

    #[test]
    fn test_render_placeholder_caps_canopy() {
        let content = render_placeholder(30);
        assert!(content.contains("Day 30: biomass=550.0, canopy=100.0"));
    }
}
