//! Sliding-window sequence construction.
//!
//! For a normalized series of length `N` and lookback `L`, window `i` holds rows
//! `[i, i + L)` and its target is row `i + L` projected onto the target spec.
//! Only fully populated windows are emitted (no padding, no wraparound), so there
//! are exactly `max(0, N - L)` of them.

use crate::domain::TargetSpec;
use crate::error::AppError;
use crate::math::scale::NormalizedSeries;

/// `L` consecutive normalized rows, one value per input feature.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    rows: Vec<Vec<f64>>,
}

impl Window {
    pub fn new(rows: Vec<Vec<f64>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn lookback(&self) -> usize {
        self.rows.len()
    }

    pub fn feature_count(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    /// Row-major `[lookback * features]` view used by the feed-forward variant.
    pub fn flatten(&self) -> Vec<f64> {
        self.rows.iter().flatten().copied().collect()
    }
}

/// Training pairs built from one series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowSet {
    pub windows: Vec<Window>,
    /// One row per window, `target_spec.width()` values each.
    pub targets: Vec<Vec<f64>>,
    /// Year of each target row.
    pub target_years: Vec<i32>,
}

impl WindowSet {
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Slide a `lookback`-long window over `series`.
///
/// `features` selects the input columns; `target` the projected target columns.
/// Both must exist in `series.features`.
pub fn make_windows(
    series: &NormalizedSeries,
    lookback: usize,
    features: &[&str],
    target: &TargetSpec,
) -> Result<WindowSet, AppError> {
    if lookback == 0 {
        return Err(AppError::shape("Lookback must be at least 1."));
    }
    if features.is_empty() {
        return Err(AppError::shape("At least one input feature is required."));
    }

    let input_idx = column_indices(series, features)?;
    let target_idx = column_indices(series, &target.names())?;

    let count = series.len().saturating_sub(lookback);
    let mut set = WindowSet {
        windows: Vec::with_capacity(count),
        targets: Vec::with_capacity(count),
        target_years: Vec::with_capacity(count),
    };

    for i in 0..count {
        let rows = series.rows[i..i + lookback]
            .iter()
            .map(|row| input_idx.iter().map(|&c| row.values[c]).collect())
            .collect();
        let next = &series.rows[i + lookback];
        set.windows.push(Window::new(rows));
        set.targets.push(target_idx.iter().map(|&c| next.values[c]).collect());
        set.target_years.push(next.year);
    }

    Ok(set)
}

/// Turn an empty window set into a descriptive insufficiency error.
pub fn require_windows(set: WindowSet, lookback: usize, available: usize) -> Result<WindowSet, AppError> {
    if set.is_empty() {
        return Err(AppError::data_insufficient(lookback, available));
    }
    Ok(set)
}

fn column_indices(series: &NormalizedSeries, names: &[&str]) -> Result<Vec<usize>, AppError> {
    names
        .iter()
        .map(|name| {
            series
                .features
                .iter()
                .position(|f| f == name)
                .ok_or_else(|| AppError::shape(format!("Series has no feature '{name}'.")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::clean::clean_series;
    use crate::error::ErrorKind;
    use crate::math::scale::{denormalize, fit, normalize};
    use serde_json::json;

    fn normalized(values: &[(i32, f64)]) -> (NormalizedSeries, crate::domain::NormalizationProfile) {
        let raw: Vec<_> = values
            .iter()
            .map(|&(y, v)| json!({"year": y, "emigrants": v}).as_object().unwrap().clone())
            .collect();
        let series = clean_series(&raw, &["emigrants"]);
        let profile = fit(&series, &["emigrants"]);
        (normalize(&series, &profile, &["emigrants"]).unwrap(), profile)
    }

    #[test]
    fn five_years_lookback_three() {
        let (series, profile) =
            normalized(&[(2019, 10.0), (2020, 12.0), (2021, 9.0), (2022, 14.0), (2023, 11.0)]);
        let set = make_windows(&series, 3, &["emigrants"], &TargetSpec::single("emigrants")).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.target_years, vec![2022, 2023]);

        let (min, max) = profile.range("emigrants").unwrap();
        let raw = |v: f64| denormalize(v, min, max).round();
        let w0: Vec<f64> = set.windows[0].flatten().into_iter().map(raw).collect();
        let w1: Vec<f64> = set.windows[1].flatten().into_iter().map(raw).collect();
        assert_eq!(w0, vec![10.0, 12.0, 9.0]);
        assert_eq!(raw(set.targets[0][0]), 14.0);
        assert_eq!(w1, vec![12.0, 9.0, 14.0]);
        assert_eq!(raw(set.targets[1][0]), 11.0);
    }

    #[test]
    fn window_count_is_n_minus_l() {
        let values: Vec<(i32, f64)> = (0..12).map(|i| (2000 + i, f64::from(i))).collect();
        let (series, _) = normalized(&values);
        for lookback in 1..15 {
            let set = make_windows(&series, lookback, &["emigrants"], &TargetSpec::single("emigrants")).unwrap();
            assert_eq!(set.len(), 12usize.saturating_sub(lookback), "lookback={lookback}");
        }
    }

    #[test]
    fn short_series_is_insufficient() {
        let (series, _) = normalized(&[(2019, 1.0), (2020, 2.0), (2021, 3.0), (2022, 4.0)]);
        let set = make_windows(&series, 6, &["emigrants"], &TargetSpec::single("emigrants")).unwrap();
        assert!(set.is_empty());
        let err = require_windows(set, 6, series.len()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataInsufficient);
        assert!(err.to_string().contains("need at least 6, have 4"));
    }

    #[test]
    fn paired_targets_project_both_columns() {
        let series = NormalizedSeries {
            features: vec!["male".into(), "female".into()],
            rows: (0..4)
                .map(|i| crate::math::scale::NormalizedRow {
                    year: 2000 + i,
                    values: vec![f64::from(i) / 10.0, f64::from(i) / 5.0],
                })
                .collect(),
        };
        let set = make_windows(&series, 2, &["male", "female"], &TargetSpec::pair("male", "female")).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.windows[0].feature_count(), 2);
        assert_eq!(set.targets[1], vec![0.3, 0.6]);
    }

    #[test]
    fn zero_lookback_and_unknown_target_fail() {
        let (series, _) = normalized(&[(2019, 1.0), (2020, 2.0)]);
        let spec = TargetSpec::single("emigrants");
        assert_eq!(make_windows(&series, 0, &["emigrants"], &spec).unwrap_err().kind(), ErrorKind::ShapeMismatch);
        let err = make_windows(&series, 1, &["emigrants"], &TargetSpec::single("male")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
    }
}
