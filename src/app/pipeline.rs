//! Shared train/forecast workflows.
//!
//! Keeping this in one place avoids mixing the core workflow with presentation:
//! raw records -> sessions per purpose -> persist, and
//! restore -> repair -> recursive forecast.
//!
//! `app` only prints what these functions return.

use std::collections::BTreeMap;

use tracing::info;

use crate::data::{RawRecord, clean_series, derive_sum};
use crate::domain::{
    EpochLog, FEMALE_FEATURE, ForecastPoint, MALE_FEATURE, ModelMetadata, PairedForecastPoint,
    Purpose, TOTAL_FEATURE, TrainConfig,
};
use crate::error::{AppError, ErrorKind};
use crate::fit::{SingleFlight, TrainOutcome, train_purpose};
use crate::forecast::{forecast, forecast_paired};
use crate::store::{LifecycleManager, ModelStore};

/// All outputs of one `ef train` run, in training order.
#[derive(Debug, Clone)]
pub struct TrainRun {
    pub outcomes: Vec<(Purpose, TrainOutcome)>,
}

/// Purposes the records can support.
///
/// `requested` wins when non-empty. Otherwise the total is always trained, and
/// both sexes when at least one record carries usable values for both.
pub fn purposes_for(raw: &[RawRecord], requested: &[Purpose]) -> Vec<Purpose> {
    if !requested.is_empty() {
        let mut out = requested.to_vec();
        out.sort();
        out.dedup();
        return out;
    }
    let mut out = vec![Purpose::Total];
    if !clean_series(raw, &[MALE_FEATURE, FEMALE_FEATURE]).is_empty() {
        out.extend([Purpose::Male, Purpose::Female]);
    }
    out
}

/// Train every purpose sequentially, then persist them together.
///
/// Any failure aborts the run before anything is saved.
pub fn run_training<S: ModelStore>(
    mut raw: Vec<RawRecord>,
    requested: &[Purpose],
    config: &TrainConfig,
    manager: &mut LifecycleManager<S>,
    guard: &SingleFlight,
    progress: &mut dyn FnMut(Purpose, &EpochLog),
) -> Result<TrainRun, AppError> {
    let _ticket = guard.begin()?;

    derive_sum(&mut raw, TOTAL_FEATURE, [MALE_FEATURE, FEMALE_FEATURE]);
    let purposes = purposes_for(&raw, requested);
    info!(?purposes, "training run started");

    let mut outcomes = Vec::with_capacity(purposes.len());
    for purpose in purposes {
        let mut cb = |_: usize, log: &EpochLog| progress(purpose, log);
        let outcome = train_purpose(&raw, purpose, config, Some(&mut cb))?;
        outcomes.push((purpose, outcome));
    }

    for (purpose, outcome) in &outcomes {
        manager.save(*purpose, &outcome.model, &outcome.metadata)?;
    }
    info!(models = outcomes.len(), "training run finished");

    Ok(TrainRun { outcomes })
}

/// All outputs of one `ef forecast` run.
#[derive(Debug, Clone, Default)]
pub struct ForecastRun {
    pub total: Option<(ModelMetadata, Vec<ForecastPoint>)>,
    pub by_sex: Option<Vec<PairedForecastPoint>>,
}

/// Restore saved models and project `years` ahead.
///
/// The total model forecasts on its own; the male and female models run in
/// lockstep when both are present.
pub fn run_forecast<S: ModelStore>(
    manager: &LifecycleManager<S>,
    years: usize,
) -> Result<ForecastRun, AppError> {
    let restored: BTreeMap<_, _> = manager.restore_all();
    if restored.is_empty() {
        return Err(AppError::new(
            ErrorKind::PersistenceMiss,
            format!(
                "No saved models under '{}'. Run `ef train` first.",
                manager.keys().prefix
            ),
        ));
    }

    let mut run = ForecastRun::default();
    if let Some(total) = restored.get(&Purpose::Total) {
        let points = forecast(&total.model, &total.metadata, years)?;
        run.total = Some((total.metadata.clone(), points));
    }
    if let (Some(m), Some(f)) = (restored.get(&Purpose::Male), restored.get(&Purpose::Female)) {
        run.by_sex = Some(forecast_paired(
            (&m.model, &m.metadata),
            (&f.model, &f.metadata),
            years,
        )?);
    }
    Ok(run)
}
