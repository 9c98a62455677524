//! Metadata repair.
//!
//! Saved or uploaded metadata can be incomplete: older versions did not store
//! the seed window, hand-edited files lose ranges, NaN sneaks into JSON as
//! `null`. [`validate_metadata`] turns whatever survived into fully populated
//! [`ModelMetadata`]. It never fails and it is idempotent.
//!
//! Rules, in order:
//!
//! - unknown model type: `recurrent`
//! - missing features: `["emigrants"]`; missing targets: the features
//! - missing or zero lookback: 3
//! - missing min/max: 0 / 1; zero-width or inverted ranges are widened
//! - missing last year: the latest seed-window year, else the previous calendar year
//! - seed window missing or shorter than the lookback: `lookback` rows at each
//!   feature's midpoint, years counting down from the last year
//! - seed window longer than the lookback: its last `lookback` rows
//! - missing or non-finite seed values: the feature's midpoint
//! - a zeroed metrics entry for every target without one
//!
//! Each repair is logged as a warning.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde_json::Value;
use tracing::warn;

use crate::domain::{Metrics, ModelKind, ModelMetadata, TOTAL_FEATURE, YearRecord};
use crate::math::widen;
use crate::models::Architecture;

const DEFAULT_LOOKBACK: usize = 3;
/// Lookbacks beyond this are treated as corrupt.
const MAX_LOOKBACK: usize = 64;

/// One seed row as read from untrusted JSON.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialRow {
    pub year: Option<i32>,
    pub values: BTreeMap<String, Option<f64>>,
}

/// Metadata with every field optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialMetadata {
    pub model_type: Option<ModelKind>,
    pub lookback: Option<usize>,
    pub features: Option<Vec<String>>,
    pub targets: Option<Vec<String>>,
    pub mins: BTreeMap<String, f64>,
    pub maxs: BTreeMap<String, f64>,
    pub last_year: Option<i32>,
    pub last_window: Option<Vec<PartialRow>>,
    pub metrics: BTreeMap<String, Metrics>,
    pub trained_at: Option<DateTime<Utc>>,
}

impl From<ModelMetadata> for PartialMetadata {
    fn from(m: ModelMetadata) -> Self {
        Self {
            model_type: Some(m.model_type),
            lookback: Some(m.lookback),
            features: Some(m.features),
            targets: Some(m.targets),
            mins: m.mins,
            maxs: m.maxs,
            last_year: Some(m.last_year),
            last_window: Some(
                m.last_window
                    .into_iter()
                    .map(|r| PartialRow {
                        year: Some(r.year),
                        values: r.values.into_iter().map(|(k, v)| (k, Some(v))).collect(),
                    })
                    .collect(),
            ),
            metrics: m.metrics,
            trained_at: Some(m.trained_at),
        }
    }
}

impl PartialMetadata {
    /// Read whatever is usable from a JSON document. Never fails.
    ///
    /// Both camelCase and snake_case field names are accepted.
    pub fn from_json(v: &Value) -> Self {
        let Some(obj) = v.as_object() else {
            return Self::default();
        };
        let field = |camel: &str, snake: &str| obj.get(camel).or_else(|| obj.get(snake));

        Self {
            model_type: field("modelType", "model_type")
                .and_then(Value::as_str)
                .and_then(ModelKind::parse_lenient),
            lookback: field("lookback", "lookback")
                .and_then(as_f64)
                .filter(|l| *l >= 0.0 && l.fract() == 0.0)
                .map(|l| l as usize),
            features: field("features", "features").and_then(string_list),
            targets: field("targets", "targets").and_then(string_list),
            mins: field("mins", "mins").map(number_map).unwrap_or_default(),
            maxs: field("maxs", "maxs").map(number_map).unwrap_or_default(),
            last_year: field("lastYear", "last_year").and_then(as_year),
            last_window: field("lastWindow", "last_window")
                .and_then(Value::as_array)
                .map(|rows| rows.iter().filter_map(partial_row).collect()),
            metrics: field("metrics", "metrics")
                .and_then(Value::as_object)
                .map(|m| {
                    m.iter()
                        .filter_map(|(k, v)| {
                            serde_json::from_value::<Metrics>(v.clone()).ok().map(|mm| (k.clone(), mm))
                        })
                        .collect()
                })
                .unwrap_or_default(),
            trained_at: field("trainedAt", "trained_at")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc)),
        }
    }

    /// Take the kind and lookback from the network that will use this metadata.
    ///
    /// A single-feature network with no recorded features gets the total column.
    pub fn align_to(&mut self, architecture: &Architecture) {
        self.model_type = Some(architecture.kind);
        if self.lookback != Some(architecture.lookback) {
            warn!(
                saved = ?self.lookback,
                model = architecture.lookback,
                "metadata lookback disagrees with model, using the model's"
            );
            self.lookback = Some(architecture.lookback);
        }
        if self.features.is_none() && architecture.feature_count == 1 {
            self.features = Some(vec![TOTAL_FEATURE.to_string()]);
        }
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    let f = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    f.filter(|f| f.is_finite())
}

fn as_year(v: &Value) -> Option<i32> {
    as_f64(v)
        .filter(|y| y.fract() == 0.0 && *y > 0.0 && *y <= i32::MAX as f64)
        .map(|y| y as i32)
}

fn string_list(v: &Value) -> Option<Vec<String>> {
    let list: Vec<String> = v
        .as_array()?
        .iter()
        .filter_map(|s| s.as_str().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty())
        .collect();
    (!list.is_empty()).then_some(list)
}

fn number_map(v: &Value) -> BTreeMap<String, f64> {
    v.as_object()
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| as_f64(v).map(|f| (k.clone(), f)))
                .collect()
        })
        .unwrap_or_default()
}

fn partial_row(v: &Value) -> Option<PartialRow> {
    let obj = v.as_object()?;
    let mut row = PartialRow {
        year: obj.get("year").and_then(as_year),
        values: BTreeMap::new(),
    };
    for (k, v) in obj {
        if k != "year" {
            row.values.insert(k.clone(), as_f64(v));
        }
    }
    Some(row)
}

/// Repair metadata, returning the list of repairs applied.
pub fn repair_metadata(partial: PartialMetadata) -> (ModelMetadata, Vec<String>) {
    let mut repairs = Vec::new();
    match try_repair(partial, &mut repairs) {
        Some(md) => (md, repairs),
        None => {
            repairs.push("metadata unusable, replaced with minimal default".to_string());
            (minimal_default(), repairs)
        }
    }
}

/// Repair metadata into a usable state. Never fails.
pub fn validate_metadata(partial: PartialMetadata) -> ModelMetadata {
    let (md, repairs) = repair_metadata(partial);
    for repair in &repairs {
        warn!(repair = %repair, "model metadata incomplete");
    }
    md
}

/// Smallest fully populated metadata: one `emigrants` feature, lookback 3, unit range.
pub fn minimal_default() -> ModelMetadata {
    let features = vec![TOTAL_FEATURE.to_string()];
    let last_year = previous_year();
    let mins = BTreeMap::from([(TOTAL_FEATURE.to_string(), 0.0)]);
    let maxs = BTreeMap::from([(TOTAL_FEATURE.to_string(), 1.0)]);
    let last_window = synthetic_window(&features, &mins, &maxs, DEFAULT_LOOKBACK, last_year);
    ModelMetadata {
        model_type: ModelKind::Recurrent,
        lookback: DEFAULT_LOOKBACK,
        targets: features.clone(),
        features,
        mins,
        maxs,
        last_year,
        last_window,
        metrics: BTreeMap::from([(TOTAL_FEATURE.to_string(), Metrics::default())]),
        trained_at: DateTime::<Utc>::default(),
    }
}

fn previous_year() -> i32 {
    Utc::now().year() - 1
}

fn midpoint(mins: &BTreeMap<String, f64>, maxs: &BTreeMap<String, f64>, feature: &str) -> f64 {
    let min = mins.get(feature).copied().unwrap_or(0.0);
    let max = maxs.get(feature).copied().unwrap_or(1.0);
    (min + max) / 2.0
}

/// `lookback` rows at each feature's midpoint, ending at `last_year`.
fn synthetic_window(
    columns: &[String],
    mins: &BTreeMap<String, f64>,
    maxs: &BTreeMap<String, f64>,
    lookback: usize,
    last_year: i32,
) -> Vec<YearRecord> {
    (0..lookback)
        .map(|i| {
            let year = last_year - (lookback - 1 - i) as i32;
            columns.iter().fold(YearRecord::new(year), |rec, f| {
                rec.with(f, midpoint(mins, maxs, f))
            })
        })
        .collect()
}

fn try_repair(p: PartialMetadata, repairs: &mut Vec<String>) -> Option<ModelMetadata> {
    let model_type = p.model_type.unwrap_or_else(|| {
        repairs.push("model type missing, assuming recurrent".into());
        ModelKind::Recurrent
    });

    let lookback = match p.lookback {
        Some(l) if l > MAX_LOOKBACK => return None,
        Some(l) if l > 0 => l,
        _ => {
            repairs.push(format!("lookback missing, using {DEFAULT_LOOKBACK}"));
            DEFAULT_LOOKBACK
        }
    };

    let features = p.features.unwrap_or_else(|| {
        repairs.push(format!("features missing, using [{TOTAL_FEATURE}]"));
        vec![TOTAL_FEATURE.to_string()]
    });
    let targets = match p.targets {
        Some(t) if (1..=2).contains(&t.len()) => t,
        _ => {
            repairs.push("targets missing, using the features".into());
            features.iter().take(2).cloned().collect()
        }
    };

    // Every column the forecaster touches needs a range.
    let mut columns = features.clone();
    for t in &targets {
        if !columns.contains(t) {
            columns.push(t.clone());
        }
    }

    let mut mins = p.mins;
    let mut maxs = p.maxs;
    for c in &columns {
        let min = *mins.entry(c.clone()).or_insert_with(|| {
            repairs.push(format!("min for '{c}' missing, using 0"));
            0.0
        });
        let max = *maxs.entry(c.clone()).or_insert_with(|| {
            repairs.push(format!("max for '{c}' missing, using 1"));
            1.0
        });
        let (wmin, wmax) = widen(min, max);
        if (wmin, wmax) != (min, max) {
            repairs.push(format!("range for '{c}' widened to [{wmin}, {wmax}]"));
            mins.insert(c.clone(), wmin);
            maxs.insert(c.clone(), wmax);
        }
    }

    let window_last_year = p
        .last_window
        .as_ref()
        .and_then(|rows| rows.iter().filter_map(|r| r.year).max());
    let last_year = match (p.last_year, window_last_year) {
        (Some(y), _) => y,
        (None, Some(y)) => {
            repairs.push(format!("last year missing, using {y} from the seed window"));
            y
        }
        (None, None) => {
            let y = previous_year();
            repairs.push(format!("last year missing, using {y}"));
            y
        }
    };

    let last_window = match p.last_window {
        Some(rows) if rows.len() >= lookback => {
            if rows.len() > lookback {
                repairs.push(format!(
                    "seed window has {} rows, keeping the last {lookback}",
                    rows.len()
                ));
            }
            let start = rows.len() - lookback;
            rows.into_iter()
                .skip(start)
                .enumerate()
                .map(|(i, row)| {
                    let year = row.year.unwrap_or_else(|| {
                        let y = last_year - (lookback - 1 - i) as i32;
                        repairs.push(format!("seed row {i} has no year, using {y}"));
                        y
                    });
                    let mut rec = YearRecord::new(year);
                    for (k, v) in row.values {
                        if let Some(v) = v {
                            rec.values.insert(k, v);
                        }
                    }
                    for c in &columns {
                        if rec.value(c).is_none() {
                            let mid = midpoint(&mins, &maxs, c);
                            repairs.push(format!("seed value '{c}' for {year} missing, using {mid}"));
                            rec.values.insert(c.clone(), mid);
                        }
                    }
                    rec
                })
                .collect()
        }
        other => {
            let have = other.map(|r| r.len()).unwrap_or(0);
            repairs.push(format!(
                "seed window has {have} rows, need {lookback}; synthesizing from midpoints"
            ));
            synthetic_window(&columns, &mins, &maxs, lookback, last_year)
        }
    };

    let mut metrics = p.metrics;
    for t in &targets {
        metrics.entry(t.clone()).or_insert_with(|| {
            repairs.push(format!("metrics for '{t}' missing, using zeros"));
            Metrics::default()
        });
    }

    let trained_at = p.trained_at.unwrap_or_else(|| {
        repairs.push("training timestamp missing".into());
        DateTime::<Utc>::default()
    });

    Some(ModelMetadata {
        model_type,
        lookback,
        features,
        targets,
        mins,
        maxs,
        last_year,
        last_window,
        metrics,
        trained_at,
    })
}
