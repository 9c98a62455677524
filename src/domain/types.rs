//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during training and forecasting
//! - persisted as model metadata (JSON)
//! - exported to portable artifacts and CSV

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Feature name of the total emigrant count.
pub const TOTAL_FEATURE: &str = "emigrants";
pub const MALE_FEATURE: &str = "male";
pub const FEMALE_FEATURE: &str = "female";

/// One calendar year of feature values.
///
/// Serialized flat: `{"year": 2020, "male": 10.0, "female": 12.0}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearRecord {
    pub year: i32,
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

impl YearRecord {
    pub fn new(year: i32) -> Self {
        Self {
            year,
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, feature: &str, value: f64) -> Self {
        self.values.insert(feature.to_string(), value);
        self
    }

    pub fn value(&self, feature: &str) -> Option<f64> {
        self.values.get(feature).copied()
    }
}

/// A cleaned series: strictly increasing years, no duplicates.
///
/// Only the cleaner builds these, so the ordering invariant holds for every
/// instance handed to the normalizer and windower.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    records: Vec<YearRecord>,
}

impl Series {
    pub(crate) fn from_sorted(records: Vec<YearRecord>) -> Self {
        debug_assert!(records.windows(2).all(|w| w[0].year < w[1].year));
        Self { records }
    }

    pub fn records(&self) -> &[YearRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn years(&self) -> Vec<i32> {
        self.records.iter().map(|r| r.year).collect()
    }

    /// Values of one feature in year order (missing values are skipped).
    pub fn column(&self, feature: &str) -> Vec<f64> {
        self.records.iter().filter_map(|r| r.value(feature)).collect()
    }

    pub fn last_year(&self) -> Option<i32> {
        self.records.last().map(|r| r.year)
    }

    /// The last `n` records (or all of them when the series is shorter).
    pub fn tail(&self, n: usize) -> &[YearRecord] {
        let start = self.records.len().saturating_sub(n);
        &self.records[start..]
    }
}

/// Which regression architecture a model uses.
///
/// Older metadata and artifacts label these `LSTM` / `MLP`; both spellings are
/// accepted on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum ModelKind {
    #[serde(rename = "recurrent", alias = "LSTM", alias = "lstm", alias = "rnn")]
    #[value(name = "recurrent", alias = "lstm")]
    Recurrent,
    #[serde(rename = "feedforward", alias = "MLP", alias = "mlp", alias = "dense")]
    #[value(name = "feedforward", alias = "mlp")]
    FeedForward,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Recurrent, ModelKind::FeedForward];

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::Recurrent => "Recurrent (2x50)",
            ModelKind::FeedForward => "Feed-forward (200/100)",
        }
    }

    /// Stable identifier used in store keys and file names.
    pub fn slug(self) -> &'static str {
        match self {
            ModelKind::Recurrent => "recurrent",
            ModelKind::FeedForward => "feedforward",
        }
    }

    /// Lenient parse used when repairing metadata read from untrusted JSON.
    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recurrent" | "lstm" | "rnn" => Some(ModelKind::Recurrent),
            "feedforward" | "feed-forward" | "mlp" | "dense" => Some(ModelKind::FeedForward),
            _ => None,
        }
    }
}

/// Storage slot of a trained model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Total,
    Male,
    Female,
}

impl Purpose {
    pub const ALL: [Purpose; 3] = [Purpose::Total, Purpose::Male, Purpose::Female];

    pub fn as_str(self) -> &'static str {
        match self {
            Purpose::Total => "total",
            Purpose::Male => "male",
            Purpose::Female => "female",
        }
    }

    /// Feature a single-target model for this purpose learns.
    pub fn feature(self) -> &'static str {
        match self {
            Purpose::Total => TOTAL_FEATURE,
            Purpose::Male => MALE_FEATURE,
            Purpose::Female => FEMALE_FEATURE,
        }
    }
}

impl std::fmt::Display for Purpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a window's target projects onto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    Single(String),
    Pair(String, String),
}

impl TargetSpec {
    pub fn single(feature: &str) -> Self {
        TargetSpec::Single(feature.to_string())
    }

    pub fn pair(a: &str, b: &str) -> Self {
        TargetSpec::Pair(a.to_string(), b.to_string())
    }

    /// Build from a target list; only widths 1 and 2 exist.
    pub fn from_names(names: &[String]) -> Option<Self> {
        match names {
            [a] => Some(TargetSpec::Single(a.clone())),
            [a, b] => Some(TargetSpec::Pair(a.clone(), b.clone())),
            _ => None,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        match self {
            TargetSpec::Single(a) => vec![a.as_str()],
            TargetSpec::Pair(a, b) => vec![a.as_str(), b.as_str()],
        }
    }

    pub fn width(&self) -> usize {
        match self {
            TargetSpec::Single(_) => 1,
            TargetSpec::Pair(_, _) => 2,
        }
    }
}

/// Per-feature min/max used to rescale values into `[0, 1]` and back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationProfile {
    pub mins: BTreeMap<String, f64>,
    pub maxs: BTreeMap<String, f64>,
}

/// Accuracy metrics of a model over its whole training set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub mae: f64,
    pub rmse: f64,
    pub mape: f64,
    pub r2: f64,
    pub accuracy: f64,
}

/// Everything needed to use a trained model again after reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    pub model_type: ModelKind,
    pub lookback: usize,
    pub features: Vec<String>,
    pub targets: Vec<String>,
    pub mins: BTreeMap<String, f64>,
    pub maxs: BTreeMap<String, f64>,
    pub last_year: i32,
    /// The last `lookback` real observations (original scale), used as the forecast seed.
    pub last_window: Vec<YearRecord>,
    pub metrics: BTreeMap<String, Metrics>,
    pub trained_at: DateTime<Utc>,
}

impl ModelMetadata {
    pub fn profile(&self) -> NormalizationProfile {
        NormalizationProfile {
            mins: self.mins.clone(),
            maxs: self.maxs.clone(),
        }
    }

    pub fn target_spec(&self) -> Option<TargetSpec> {
        TargetSpec::from_names(&self.targets)
    }
}

/// One projected year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPoint {
    pub year: i32,
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
    pub is_forecast: bool,
}

impl ForecastPoint {
    pub fn value(&self, target: &str) -> Option<f64> {
        self.values.get(target).copied()
    }
}

/// One projected year of the male/female lockstep forecast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairedForecastPoint {
    pub year: i32,
    pub male: f64,
    pub female: f64,
    /// Derived as `male + female`; never a forecast target itself.
    pub total: f64,
    pub is_forecast: bool,
}

/// One row of the held-out validation table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValidationRow {
    pub year: i32,
    pub actual: f64,
    pub predicted: f64,
    pub error: f64,
}

/// Progress values reported after an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpochLog {
    pub epoch: usize,
    pub loss: f64,
    pub mae: f64,
    pub val_loss: Option<f64>,
    pub val_mae: Option<f64>,
}

/// Per-epoch record of a training run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochLog>,
}

impl TrainingHistory {
    pub fn last(&self) -> Option<&EpochLog> {
        self.epochs.last()
    }
}

/// Training-run configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    pub model_kind: ModelKind,
    pub lookback: usize,
    pub epochs: usize,
    pub validation_fraction: f64,
    /// Report progress every N epochs (the final epoch is always reported).
    pub progress_every: usize,
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            model_kind: ModelKind::Recurrent,
            lookback: 3,
            epochs: 100,
            validation_fraction: 0.2,
            progress_every: 20,
            seed: 42,
        }
    }
}
