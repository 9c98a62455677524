//! Recursive multi-step forecasting.
//!
//! The forecaster owns a rolling window of normalized rows. Each step predicts
//! one year ahead, emits the denormalized point, then drops the oldest row and
//! appends the prediction. Input features that are not targets carry their last
//! value forward.
//!
//! [`RecursiveForecaster`] is an iterator, so callers may stop early; a new call
//! always starts again from the seed it is given.

use std::collections::VecDeque;

use tracing::debug;

use crate::data::Window;
use crate::domain::{
    ForecastPoint, ModelMetadata, NormalizationProfile, PairedForecastPoint, YearRecord,
};
use crate::error::{AppError, ErrorKind};
use crate::models::Predict;

/// Rolling-window state of one forecast.
pub struct RecursiveForecaster<'a, P: Predict> {
    predictor: &'a P,
    profile: NormalizationProfile,
    features: Vec<String>,
    targets: Vec<String>,
    /// For each target, its column among the input features (if it is one).
    target_cols: Vec<Option<usize>>,
    window: VecDeque<Vec<f64>>,
    last_year: i32,
    step: usize,
    horizon: usize,
    done: bool,
}

impl<'a, P: Predict> RecursiveForecaster<'a, P> {
    /// Seed a forecast from original-scale rows.
    ///
    /// `seed` must hold at least `lookback` rows; only the last `lookback` are
    /// used. Points are emitted for `last_year + 1 ..= last_year + horizon`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        predictor: &'a P,
        profile: NormalizationProfile,
        features: Vec<String>,
        targets: Vec<String>,
        lookback: usize,
        seed: &[YearRecord],
        last_year: i32,
        horizon: usize,
    ) -> Result<Self, AppError> {
        if lookback == 0 || features.is_empty() || targets.is_empty() {
            return Err(AppError::shape(
                "Forecasting needs a positive lookback, input features and targets.",
            ));
        }
        if seed.len() < lookback {
            return Err(AppError::shape(format!(
                "Seed window has {} rows, expected at least {lookback}.",
                seed.len()
            )));
        }

        let mut window = VecDeque::with_capacity(lookback);
        for record in &seed[seed.len() - lookback..] {
            let mut row = Vec::with_capacity(features.len());
            for feature in &features {
                let v = record.value(feature).ok_or_else(|| {
                    AppError::shape(format!(
                        "Seed year {} has no value for '{feature}'.",
                        record.year
                    ))
                })?;
                row.push(profile.normalize_value(feature, v)?);
            }
            window.push_back(row);
        }
        for target in &targets {
            profile.range(target)?;
        }

        let target_cols = targets
            .iter()
            .map(|t| features.iter().position(|f| f == t))
            .collect();

        Ok(Self {
            predictor,
            profile,
            features,
            targets,
            target_cols,
            window,
            last_year,
            step: 0,
            horizon,
            done: false,
        })
    }

    /// Seed from a (repaired) model's metadata.
    pub fn from_metadata(
        predictor: &'a P,
        metadata: &ModelMetadata,
        horizon: usize,
    ) -> Result<Self, AppError> {
        Self::new(
            predictor,
            metadata.profile(),
            metadata.features.clone(),
            metadata.targets.clone(),
            metadata.lookback,
            &metadata.last_window,
            metadata.last_year,
            horizon,
        )
    }

    fn advance(&mut self) -> Result<ForecastPoint, AppError> {
        let current = Window::new(self.window.iter().cloned().collect());
        let rows = self.predictor.predict(std::slice::from_ref(&current))?;
        let normalized = rows.into_iter().next().ok_or_else(|| {
            AppError::new(ErrorKind::Numeric, "Predictor returned no rows.")
        })?;
        if normalized.len() != self.targets.len() {
            return Err(AppError::shape(format!(
                "Predictor returned {} values, expected {}.",
                normalized.len(),
                self.targets.len()
            )));
        }

        self.step += 1;
        let year = self.last_year + self.step as i32;
        let mut point = ForecastPoint {
            year,
            values: Default::default(),
            is_forecast: true,
        };
        for (target, &v) in self.targets.iter().zip(&normalized) {
            point
                .values
                .insert(target.clone(), self.profile.denormalize_value(target, v)?);
        }

        let mut next = self.window.back().cloned().unwrap_or_else(|| vec![0.0; self.features.len()]);
        for (col, &v) in self.target_cols.iter().zip(&normalized) {
            if let Some(c) = col {
                next[*c] = v;
            }
        }
        self.window.pop_front();
        self.window.push_back(next);

        debug!(year, values = ?point.values, "forecast step");
        Ok(point)
    }
}

impl<P: Predict> Iterator for RecursiveForecaster<'_, P> {
    type Item = Result<ForecastPoint, AppError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.step >= self.horizon {
            return None;
        }
        let item = self.advance();
        if item.is_err() {
            self.done = true;
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = if self.done { 0 } else { self.horizon - self.step };
        (0, Some(left))
    }
}

/// Project `horizon` years from a model and its metadata.
pub fn forecast<P: Predict>(
    predictor: &P,
    metadata: &ModelMetadata,
    horizon: usize,
) -> Result<Vec<ForecastPoint>, AppError> {
    RecursiveForecaster::from_metadata(predictor, metadata, horizon)?.collect()
}

/// Forecast male and female models in lockstep and derive the total.
///
/// Both models must end on the same observed year, otherwise the lockstep
/// would sum values of different years.
pub fn forecast_paired<M: Predict, F: Predict>(
    male: (&M, &ModelMetadata),
    female: (&F, &ModelMetadata),
    horizon: usize,
) -> Result<Vec<PairedForecastPoint>, AppError> {
    if male.1.last_year != female.1.last_year {
        return Err(AppError::shape(format!(
            "Male and female models end on different years ({} and {}); retrain them together.",
            male.1.last_year, female.1.last_year
        )));
    }
    let male_target = first_target(male.1)?;
    let female_target = first_target(female.1)?;
    let males = RecursiveForecaster::from_metadata(male.0, male.1, horizon)?;
    let females = RecursiveForecaster::from_metadata(female.0, female.1, horizon)?;

    males
        .zip(females)
        .map(|(m, f)| {
            let (m, f) = (m?, f?);
            let male = m.value(male_target).unwrap_or_default();
            let female = f.value(female_target).unwrap_or_default();
            Ok(PairedForecastPoint {
                year: m.year,
                male,
                female,
                total: male + female,
                is_forecast: true,
            })
        })
        .collect()
}

fn first_target(metadata: &ModelMetadata) -> Result<&str, AppError> {
    metadata
        .targets
        .first()
        .map(String::as_str)
        .ok_or_else(|| AppError::shape("Model metadata lists no targets."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModelKind;
    use std::collections::BTreeMap;

    /// Predicts the mean of the window's first column.
    struct MeanStub;

    impl Predict for MeanStub {
        fn predict(&self, windows: &[Window]) -> Result<Vec<Vec<f64>>, AppError> {
            Ok(windows
                .iter()
                .map(|w| {
                    let sum: f64 = w.rows().iter().map(|r| r[0]).sum();
                    vec![sum / w.lookback() as f64]
                })
                .collect())
        }
    }

    /// Repeats the last observed value of every column.
    struct LastStub;

    impl Predict for LastStub {
        fn predict(&self, windows: &[Window]) -> Result<Vec<Vec<f64>>, AppError> {
            Ok(windows
                .iter()
                .map(|w| w.rows().last().cloned().unwrap_or_default())
                .collect())
        }
    }

    fn metadata(feature: &str, seed: &[f64], min: f64, max: f64) -> ModelMetadata {
        ModelMetadata {
            model_type: ModelKind::Recurrent,
            lookback: seed.len(),
            features: vec![feature.to_string()],
            targets: vec![feature.to_string()],
            mins: BTreeMap::from([(feature.to_string(), min)]),
            maxs: BTreeMap::from([(feature.to_string(), max)]),
            last_year: 2020 + seed.len() as i32 - 1,
            last_window: seed
                .iter()
                .enumerate()
                .map(|(i, &v)| YearRecord::new(2020 + i as i32).with(feature, v))
                .collect(),
            metrics: BTreeMap::new(),
            trained_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn mean_stub_feeds_predictions_back() {
        let md = metadata("emigrants", &[100.0, 110.0, 105.0], 0.0, 200.0);
        let points = forecast(&MeanStub, &md, 3).unwrap();
        let got: Vec<f64> = points.iter().map(|p| p.value("emigrants").unwrap()).collect();
        let want = [105.0, 320.0 / 3.0, (105.0 + 105.0 + 320.0 / 3.0) / 3.0];
        for (g, w) in got.iter().zip(want) {
            assert!((g - w).abs() < 1e-9, "{got:?}");
        }
        assert_eq!(points.iter().map(|p| p.year).collect::<Vec<_>>(), vec![2023, 2024, 2025]);
        assert!(points.iter().all(|p| p.is_forecast));
    }

    #[test]
    fn persistence_stub_repeats_last_value() {
        let md = metadata("emigrants", &[100.0, 110.0, 105.0], 90.0, 120.0);
        let points = forecast(&LastStub, &md, 3).unwrap();
        for p in &points {
            assert!((p.value("emigrants").unwrap() - 105.0).abs() < 1e-9);
        }
    }

    #[test]
    fn zero_horizon_is_empty() {
        let md = metadata("emigrants", &[1.0, 2.0, 3.0], 0.0, 10.0);
        assert!(forecast(&MeanStub, &md, 0).unwrap().is_empty());
    }

    #[test]
    fn short_seed_is_shape_error() {
        let mut md = metadata("emigrants", &[1.0, 2.0, 3.0], 0.0, 10.0);
        md.lookback = 5;
        let err = forecast(&MeanStub, &md, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
    }

    #[test]
    fn long_seed_uses_last_rows() {
        let mut md = metadata("emigrants", &[500.0, 100.0, 110.0, 105.0], 0.0, 1000.0);
        md.lookback = 3;
        let first = forecast(&MeanStub, &md, 1).unwrap();
        assert!((first[0].value("emigrants").unwrap() - 105.0).abs() < 1e-9);
    }

    #[test]
    fn non_target_features_carry_forward() {
        let mut md = metadata("male", &[10.0, 20.0, 30.0], 0.0, 100.0);
        md.features = vec!["male".into(), "female".into()];
        md.mins.insert("female".into(), 0.0);
        md.maxs.insert("female".into(), 100.0);
        for (rec, f) in md.last_window.iter_mut().zip([40.0, 50.0, 60.0]) {
            rec.values.insert("female".into(), f);
        }

        let mut f = RecursiveForecaster::from_metadata(&MeanStub, &md, 2).unwrap();
        f.next().unwrap().unwrap();
        let last = f.window.back().unwrap();
        assert!((last[0] - 0.2).abs() < 1e-12);
        assert!((last[1] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn paired_total_is_sum_of_parts() {
        let male = metadata("male", &[10.0, 20.0, 30.0], 0.0, 100.0);
        let female = metadata("female", &[40.0, 50.0, 60.0], 0.0, 200.0);
        let points = forecast_paired((&LastStub, &male), (&MeanStub, &female), 4).unwrap();
        assert_eq!(points.len(), 4);
        for p in &points {
            assert!((p.total - (p.male + p.female)).abs() < 1e-12);
            assert!((p.male - 30.0).abs() < 1e-9);
        }
        assert!((points[0].female - 50.0).abs() < 1e-9);
    }

    #[test]
    fn paired_models_must_end_on_the_same_year() {
        let male = metadata("male", &[10.0, 20.0, 30.0], 0.0, 100.0);
        let mut female = metadata("female", &[40.0, 50.0, 60.0], 0.0, 200.0);
        female.last_year += 1;
        for rec in female.last_window.iter_mut() {
            rec.year += 1;
        }
        let err = forecast_paired((&LastStub, &male), (&LastStub, &female), 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
        assert!(err.message().contains("2022 and 2023"), "{}", err.message());
    }

    struct FailingStub;

    impl Predict for FailingStub {
        fn predict(&self, _: &[Window]) -> Result<Vec<Vec<f64>>, AppError> {
            Err(AppError::new(ErrorKind::Numeric, "boom"))
        }
    }

    #[test]
    fn iterator_stops_after_an_error() {
        let md = metadata("emigrants", &[1.0, 2.0, 3.0], 0.0, 10.0);
        let mut f = RecursiveForecaster::from_metadata(&FailingStub, &md, 5).unwrap();
        assert!(f.next().unwrap().is_err());
        assert!(f.next().is_none());
    }
}
