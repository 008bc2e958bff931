//! Result ingestion: artifact → raw rows → canonical daily records.
//!
//! # Modules
//!
//! - [`format`]: `ResultFormat` detection and raw row extraction
//! - [`normalize`]: alias table mapping raw column names to canonical fields

pub mod format;
pub mod normalize;

pub use format::{detect_format, parse_raw, render_placeholder, ResultFormat, PLACEHOLDER_MARKER};
pub use normalize::{aliases, normalize, resolve, resolve_day, ALIAS_TABLE, DAY_ALIASES};

use crate::domain::CanonicalDailyRecord;
use crate::error::{CropsimError, Result};
use crate::obs;
use std::path::Path;
use tracing::warn;

/// Canonical records parsed from one artifact, with the layout they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Ingested {
    pub format: ResultFormat,
    pub records: Vec<CanonicalDailyRecord>,
}

/// Read a result artifact from disk and normalize it.
///
/// Fails with `ResultNotFound` when the file is missing and `EmptyResult`
/// when nothing could be parsed from it.
pub fn ingest(path: &Path) -> Result<Vec<CanonicalDailyRecord>> {
    ingest_detailed(path).map(|ingested| ingested.records)
}

/// Like [`ingest`], also reporting the detected format.
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected; the
/// tokens they land in fail numeric conversion and stay as text.
pub fn ingest_detailed(path: &Path) -> Result<Ingested> {
    let bytes = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CropsimError::ResultNotFound(path.to_path_buf())
        } else {
            CropsimError::Io(e)
        }
    })?;
    ingest_str(&String::from_utf8_lossy(&bytes), path)
}

/// Normalize already-loaded artifact content. `source` is only used for
/// error reporting and logs.
pub fn ingest_str(content: &str, source: &Path) -> Result<Ingested> {
    let (format, rows) = parse_raw(content);

    let records: Vec<CanonicalDailyRecord> = rows
        .iter()
        .enumerate()
        .map(|(idx, row)| normalize(row, idx as u32 + 1))
        .collect();

    if records.is_empty() {
        return Err(CropsimError::EmptyResult(source.to_path_buf()));
    }

    if records.windows(2).any(|pair| pair[1].day <= pair[0].day) {
        warn!(
            source = %source.display(),
            "day index is not strictly increasing; records kept in file order"
        );
    }

    obs::emit_ingest_completed(source, format.name(), records.len());
    Ok(Ingested { format, records })
}
