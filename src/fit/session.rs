//! One training session: raw records in, trained model plus metadata out.
//!
//! The steps are the same for every purpose:
//! clean -> fit profile -> normalize -> window -> build -> train -> score.
//! Nothing is persisted here; a failed session leaves no trace.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::info;

use crate::data::{CleanReport, RawRecord, clean_series_with_report, make_windows, require_windows};
use crate::domain::{
    FEMALE_FEATURE, MALE_FEATURE, ModelMetadata, Purpose, TargetSpec, TrainConfig, TrainingHistory,
    ValidationRow,
};
use crate::error::AppError;
use crate::math::{compute_metrics, fit, normalize, validation_table};
use crate::models::{EpochCallback, FitOptions, Predict, Regressor};

/// What a session trains on and predicts.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPlan {
    pub features: Vec<String>,
    pub target: TargetSpec,
    /// Columns a record must also carry to be kept, without being modeled.
    pub companions: Vec<String>,
    /// Build the held-out validation table (total-model runs only).
    pub validation_table: bool,
}

impl SessionPlan {
    /// Single-feature, single-target plan for one storage slot.
    ///
    /// The male and female plans keep only years reporting both sexes, so the
    /// two models share a final year and can be forecast in lockstep.
    pub fn for_purpose(purpose: Purpose) -> Self {
        let companions = match purpose {
            Purpose::Total => Vec::new(),
            Purpose::Male => vec![FEMALE_FEATURE.to_string()],
            Purpose::Female => vec![MALE_FEATURE.to_string()],
        };
        Self {
            features: vec![purpose.feature().to_string()],
            target: TargetSpec::single(purpose.feature()),
            companions,
            validation_table: purpose == Purpose::Total,
        }
    }

    /// One model predicting male and female together.
    pub fn paired() -> Self {
        Self {
            features: vec![MALE_FEATURE.to_string(), FEMALE_FEATURE.to_string()],
            target: TargetSpec::pair(MALE_FEATURE, FEMALE_FEATURE),
            companions: Vec::new(),
            validation_table: false,
        }
    }

    /// Input features followed by any target not already among them.
    fn columns(&self) -> Vec<&str> {
        let mut cols: Vec<&str> = self.features.iter().map(String::as_str).collect();
        for name in self.target.names() {
            if !cols.contains(&name) {
                cols.push(name);
            }
        }
        cols
    }

    /// Modeled columns plus companions: what the cleaner requires per record.
    fn required(&self) -> Vec<&str> {
        let mut cols = self.columns();
        for name in &self.companions {
            if !cols.contains(&name.as_str()) {
                cols.push(name);
            }
        }
        cols
    }
}

impl From<&TrainConfig> for FitOptions {
    fn from(config: &TrainConfig) -> Self {
        Self {
            epochs: config.epochs,
            validation_fraction: config.validation_fraction,
            progress_every: config.progress_every,
            seed: config.seed,
        }
    }
}

/// Everything a finished session produced.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub model: Regressor,
    pub metadata: ModelMetadata,
    pub history: TrainingHistory,
    pub validation: Vec<ValidationRow>,
    pub clean_report: CleanReport,
    pub window_count: usize,
}

/// Train the model for one purpose.
pub fn train_purpose(
    raw: &[RawRecord],
    purpose: Purpose,
    config: &TrainConfig,
    on_epoch: Option<EpochCallback<'_>>,
) -> Result<TrainOutcome, AppError> {
    info!(%purpose, kind = config.model_kind.slug(), "starting training session");
    train_session(raw, &SessionPlan::for_purpose(purpose), config, on_epoch)
}

pub fn train_session(
    raw: &[RawRecord],
    plan: &SessionPlan,
    config: &TrainConfig,
    on_epoch: Option<EpochCallback<'_>>,
) -> Result<TrainOutcome, AppError> {
    let lookback = config.lookback;
    let columns = plan.columns();
    let features: Vec<&str> = plan.features.iter().map(String::as_str).collect();

    let (series, clean_report) = clean_series_with_report(raw, &plan.required());
    let profile = fit(&series, &columns);
    let normalized = normalize(&series, &profile, &columns)?;
    let set = require_windows(
        make_windows(&normalized, lookback, &features, &plan.target)?,
        lookback,
        series.len(),
    )?;
    info!(records = series.len(), windows = set.len(), lookback, "prepared training windows");

    let mut model = Regressor::build(
        config.model_kind,
        lookback,
        features.len(),
        plan.target.width(),
        config.seed,
    )?;
    let history = model.train(&set.windows, &set.targets, &FitOptions::from(config), on_epoch)?;

    // Score on the original scale over every window.
    let predicted = model.predict(&set.windows)?;
    let observed = &series.records()[lookback..];
    let mut metrics = BTreeMap::new();
    let mut validation = Vec::new();
    for (j, name) in plan.target.names().into_iter().enumerate() {
        let actual: Vec<f64> = observed.iter().filter_map(|r| r.value(name)).collect();
        let pred = predicted
            .iter()
            .map(|row| profile.denormalize_value(name, row[j]))
            .collect::<Result<Vec<_>, _>>()?;
        metrics.insert(name.to_string(), compute_metrics(&actual, &pred)?);
        if plan.validation_table && j == 0 {
            validation = validation_table(&set.target_years, &actual, &pred);
        }
    }

    let metadata = ModelMetadata {
        model_type: config.model_kind,
        lookback,
        features: plan.features.clone(),
        targets: plan.target.names().iter().map(|s| s.to_string()).collect(),
        mins: profile.mins,
        maxs: profile.maxs,
        last_year: series.last_year().unwrap_or_default(),
        last_window: series.tail(lookback).to_vec(),
        metrics,
        trained_at: Utc::now(),
    };

    if let Some(last) = history.last() {
        info!(loss = last.loss, mae = last.mae, "training session finished");
    }

    Ok(TrainOutcome {
        model,
        metadata,
        history,
        validation,
        clean_report,
        window_count: set.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModelKind, TOTAL_FEATURE};
    use crate::error::ErrorKind;
    use serde_json::json;

    fn raw(rows: serde_json::Value) -> Vec<RawRecord> {
        rows.as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    fn quick(kind: ModelKind) -> TrainConfig {
        TrainConfig {
            model_kind: kind,
            epochs: 3,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn four_records_cannot_fill_a_lookback_of_six() {
        let data = raw(json!([
            {"year": 2019, "emigrants": 10},
            {"year": 2020, "emigrants": 12},
            {"year": 2021, "emigrants": 9},
            {"year": 2022, "emigrants": 14},
        ]));
        let config = TrainConfig {
            lookback: 6,
            ..quick(ModelKind::Recurrent)
        };
        let err = train_purpose(&data, Purpose::Total, &config, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataInsufficient);
        assert!(err.message().contains("need at least 6, have 4"), "{}", err.message());
    }

    #[test]
    fn total_session_builds_metadata_and_validation() {
        let rows: Vec<_> = (0..12)
            .map(|i| json!({"year": 2010 + i, "emigrants": 1000 + 37 * i, "male": 1}))
            .collect();
        let out = train_purpose(&raw(json!(rows)), Purpose::Total, &quick(ModelKind::FeedForward), None)
            .unwrap();

        assert_eq!(out.window_count, 9);
        assert_eq!(out.history.epochs.len(), 3);
        let md = &out.metadata;
        assert_eq!(md.features, vec![TOTAL_FEATURE.to_string()]);
        assert_eq!(md.targets, md.features);
        assert_eq!(md.last_year, 2021);
        assert_eq!(md.last_window.len(), 3);
        assert_eq!(md.last_window[0].year, 2019);
        assert_eq!(md.mins[TOTAL_FEATURE], 1000.0);
        assert_eq!(md.maxs[TOTAL_FEATURE], 1000.0 + 37.0 * 11.0);
        let m = md.metrics[TOTAL_FEATURE];
        assert!((0.0..=100.0).contains(&m.accuracy));

        // floor(9 * 0.8) = 7 -> rows for the last two targets.
        let years: Vec<i32> = out.validation.iter().map(|r| r.year).collect();
        assert_eq!(years, vec![2020, 2021]);
        assert_eq!(out.validation[1].actual, 1000.0 + 37.0 * 11.0);
    }

    #[test]
    fn gender_sessions_skip_validation_table() {
        let rows: Vec<_> = (0..6)
            .map(|i| json!({"year": 2000 + i, "male": 50 + i, "female": 60 - i}))
            .collect();
        let out = train_purpose(&raw(json!(rows)), Purpose::Female, &quick(ModelKind::Recurrent), None)
            .unwrap();
        assert!(out.validation.is_empty());
        assert!(out.metadata.metrics.contains_key(FEMALE_FEATURE));
    }

    #[test]
    fn sex_sessions_keep_only_years_with_both_sexes() {
        let mut rows: Vec<_> = (0..6)
            .map(|i| json!({"year": 2000 + i, "male": 50 + i, "female": 60 - i}))
            .collect();
        rows.push(json!({"year": 2006, "female": 70}));
        let data = raw(json!(rows));
        for purpose in [Purpose::Male, Purpose::Female] {
            let out = train_purpose(&data, purpose, &quick(ModelKind::FeedForward), None).unwrap();
            assert_eq!(out.metadata.last_year, 2005, "{purpose}");
            assert_eq!(out.clean_report.records_kept, 6);
            assert_eq!(out.metadata.features, vec![purpose.feature().to_string()]);
        }
    }

    #[test]
    fn paired_plan_predicts_two_targets() {
        let rows: Vec<_> = (0..8)
            .map(|i| json!({"year": 2000 + i, "male": 50 + i, "female": 60 + 2 * i}))
            .collect();
        let out = train_session(&raw(json!(rows)), &SessionPlan::paired(), &quick(ModelKind::Recurrent), None)
            .unwrap();
        assert_eq!(out.model.output_width(), 2);
        assert_eq!(out.metadata.targets, vec!["male".to_string(), "female".to_string()]);
        assert_eq!(out.metadata.metrics.len(), 2);
    }

    #[test]
    fn dirty_rows_are_dropped_before_training() {
        let data = raw(json!([
            {"year": 2015, "emigrants": "1,200"},
            {"year": "2016", "emigrants": 1300},
            {"year": 2017, "emigrants": -5},
            {"emigrants": 1400},
            {"year": 2018, "emigrants": 1350},
            {"year": 2019, "emigrants": 1500},
            {"year": 2020, "emigrants": null},
        ]));
        let out = train_purpose(&data, Purpose::Total, &quick(ModelKind::FeedForward), None).unwrap();
        assert_eq!(out.clean_report.records_kept, 4);
        assert_eq!(out.clean_report.dropped(), 3);
        assert_eq!(out.window_count, 1);
    }
}
