//! Raw record ingest.
//!
//! Reads the yearly emigrant records from CSV (header row, `year` plus feature
//! columns) or JSON (array of objects). Values are passed through as-is; all
//! validation happens in the cleaner, so one bad row never aborts a load.

use std::fs::File;
use std::path::Path;

use csv::StringRecord;
use serde_json::Value;
use tracing::{debug, info};

use crate::data::RawRecord;
use crate::error::AppError;

/// Source format of a records file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    Csv,
    Json,
}

impl RecordFormat {
    /// Pick the format from the file extension (`.json` or anything else as CSV).
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => RecordFormat::Json,
            _ => RecordFormat::Csv,
        }
    }
}

/// Load raw records from a CSV or JSON file.
pub fn load_records(path: &Path) -> Result<Vec<RawRecord>, AppError> {
    let records = match RecordFormat::from_path(path) {
        RecordFormat::Csv => read_csv(path)?,
        RecordFormat::Json => read_json(path)?,
    };
    info!(path = %path.display(), records = records.len(), "loaded raw records");
    Ok(records)
}

fn read_csv(path: &Path) -> Result<Vec<RawRecord>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open CSV '{}': {e}", path.display())))?;
    parse_csv(file)
}

/// Parse CSV rows into records of string values.
///
/// Headers are trimmed, lowercased and stripped of a leading BOM. Rows that
/// the CSV reader cannot parse are skipped.
pub fn parse_csv<R: std::io::Read>(reader: R) -> Result<Vec<RawRecord>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AppError::io(format!("Failed to read CSV headers: {e}")))?
        .iter()
        .map(normalize_header_name)
        .collect();
    if !headers.iter().any(|h| h == "year") {
        return Err(AppError::config("Missing required column: `year`"));
    }

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        match result {
            Ok(row) => records.push(to_record(&headers, &row)),
            // +2: one for the header row, one for 1-based line numbers.
            Err(e) => debug!(line = idx + 2, error = %e, "skipping unparseable CSV row"),
        }
    }
    Ok(records)
}

fn to_record(headers: &[String], row: &StringRecord) -> RawRecord {
    headers
        .iter()
        .zip(row.iter())
        .filter(|(h, _)| !h.is_empty())
        .map(|(h, v)| (h.clone(), Value::String(v.to_string())))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn read_json(path: &Path) -> Result<Vec<RawRecord>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open JSON '{}': {e}", path.display())))?;
    let value: Value = serde_json::from_reader(file)
        .map_err(|e| AppError::io(format!("Invalid records JSON '{}': {e}", path.display())))?;
    parse_json(value)
}

/// Accept a top-level array of objects; non-object entries are skipped.
pub fn parse_json(value: Value) -> Result<Vec<RawRecord>, AppError> {
    let Value::Array(items) = value else {
        return Err(AppError::config("Records JSON must be an array of objects."));
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect())
}
