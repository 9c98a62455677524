//! Series cleaning.
//!
//! Turns loosely-typed yearly records (JSON objects, or CSV rows read as
//! strings) into a [`Series`]: one record per year, ascending, every required
//! feature present as a finite non-negative number.
//!
//! Cleaning never fails. Records that cannot be used are dropped and counted;
//! an empty series is a normal outcome that callers check before training.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{Series, YearRecord};

/// A raw record as delivered by the record source.
pub type RawRecord = serde_json::Map<String, Value>;

/// Why records were dropped during cleaning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub records_read: usize,
    pub records_kept: usize,
    pub missing_year: usize,
    pub missing_feature: usize,
    pub invalid_value: usize,
    pub duplicate_year: usize,
}

impl CleanReport {
    pub fn dropped(&self) -> usize {
        self.records_read - self.records_kept
    }
}

enum Rejection {
    MissingFeature,
    InvalidValue,
}

/// Clean raw records into a sorted series of the given features.
pub fn clean_series(raw: &[RawRecord], features: &[&str]) -> Series {
    clean_series_with_report(raw, features).0
}

/// Like [`clean_series`], also returning the per-reason drop counts.
pub fn clean_series_with_report(raw: &[RawRecord], features: &[&str]) -> (Series, CleanReport) {
    let mut report = CleanReport {
        records_read: raw.len(),
        ..CleanReport::default()
    };
    let mut records: Vec<YearRecord> = Vec::with_capacity(raw.len());

    'rows: for row in raw {
        let Some(year) = lookup(row, "year").and_then(parse_year) else {
            report.missing_year += 1;
            continue;
        };

        let mut values = BTreeMap::new();
        for &feature in features {
            match lookup(row, feature).map(parse_value) {
                Some(Ok(v)) => {
                    values.insert(feature.to_string(), v);
                }
                Some(Err(Rejection::MissingFeature)) | None => {
                    report.missing_feature += 1;
                    continue 'rows;
                }
                Some(Err(Rejection::InvalidValue)) => {
                    report.invalid_value += 1;
                    continue 'rows;
                }
            }
        }

        records.push(YearRecord { year, values });
    }

    // Stable sort keeps input order among equal years, so dedup keeps the first.
    records.sort_by_key(|r| r.year);
    let mut seen = HashSet::with_capacity(records.len());
    records.retain(|r| {
        let first = seen.insert(r.year);
        if !first {
            report.duplicate_year += 1;
        }
        first
    });

    report.records_kept = records.len();
    debug!(?report, "cleaned yearly records");
    if report.dropped() > 0 {
        warn!(
            dropped = report.dropped(),
            kept = report.records_kept,
            "dropped unusable yearly records"
        );
    }

    (Series::from_sorted(records), report)
}

/// Fill `total` as `parts[0] + parts[1]` on records that lack it.
///
/// Records where either part is unusable are left untouched; the cleaner will
/// drop them later if `total` is required.
pub fn derive_sum(raw: &mut [RawRecord], total: &str, parts: [&str; 2]) {
    for row in raw.iter_mut() {
        let has_total = lookup(row, total).map(|v| parse_value(v).is_ok()).unwrap_or(false);
        if has_total {
            continue;
        }
        let a = lookup(row, parts[0]).and_then(|v| parse_value(v).ok());
        let b = lookup(row, parts[1]).and_then(|v| parse_value(v).ok());
        if let (Some(a), Some(b)) = (a, b) {
            if let Some(n) = serde_json::Number::from_f64(a + b) {
                row.insert(total.to_string(), Value::Number(n));
            }
        }
    }
}

/// Case-insensitive field lookup (spreadsheet exports vary header casing and
/// sometimes prefix the first header with a BOM).
fn lookup<'a>(row: &'a RawRecord, name: &str) -> Option<&'a Value> {
    if let Some(v) = row.get(name) {
        return Some(v);
    }
    row.iter()
        .find(|(k, _)| k.trim().trim_start_matches('\u{feff}').eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

fn parse_year(v: &Value) -> Option<i32> {
    let year = match v {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i
            } else {
                let f = n.as_f64()?;
                if f.fract() != 0.0 {
                    return None;
                }
                f as i64
            }
        }
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(i) => i,
                Err(_) => {
                    let f = s.parse::<f64>().ok()?;
                    if !f.is_finite() || f.fract() != 0.0 {
                        return None;
                    }
                    f as i64
                }
            }
        }
        _ => return None,
    };
    if year <= 0 {
        return None;
    }
    i32::try_from(year).ok()
}

fn parse_value(v: &Value) -> Result<f64, Rejection> {
    let value = match v {
        Value::Null => return Err(Rejection::MissingFeature),
        Value::Number(n) => n.as_f64().ok_or(Rejection::InvalidValue)?,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Err(Rejection::MissingFeature);
            }
            let cleaned: String = s.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
            cleaned.parse::<f64>().map_err(|_| Rejection::InvalidValue)?
        }
        _ => return Err(Rejection::InvalidValue),
    };
    if !value.is_finite() || value < 0.0 {
        return Err(Rejection::InvalidValue);
    }
    Ok(value)
}
