//! Min-max normalization.
//!
//! Every trained model owns one [`NormalizationProfile`] computed from the full
//! training series. All later normalize/denormalize calls for that model go
//! through the same profile, including forecasting after a reload.

use crate::domain::{NormalizationProfile, Series};
use crate::error::AppError;

/// A series mapped into `[0, 1]`, one value per feature in `features` order.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSeries {
    pub features: Vec<String>,
    pub rows: Vec<NormalizedRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub year: i32,
    pub values: Vec<f64>,
}

impl NormalizedSeries {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Guard against a zero-width (or inverted, or non-finite) range.
///
/// A flat feature gets `max = min + 1` so the division in [`normalize`] is safe
/// and the round trip stays exact. Where `+ 1` is lost to rounding the step is
/// relative to `min`; where even that overflows the range falls back to `(0, 1)`.
pub fn widen(min: f64, max: f64) -> (f64, f64) {
    let min = if min.is_finite() { min } else { 0.0 };
    if max.is_finite() && max > min {
        return (min, max);
    }
    [min + 1.0, min + min.abs() * 1e-9]
        .into_iter()
        .find(|m| m.is_finite() && *m > min)
        .map_or((0.0, 1.0), |m| (min, m))
}

/// Compute per-feature min/max over the whole series.
pub fn fit(series: &Series, features: &[&str]) -> NormalizationProfile {
    let mut profile = NormalizationProfile::default();
    for &feature in features {
        let column = series.column(feature);
        let (min, max) = if column.is_empty() {
            (0.0, 1.0)
        } else {
            let min = column.iter().copied().fold(f64::INFINITY, f64::min);
            let max = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            widen(min, max)
        };
        profile.mins.insert(feature.to_string(), min);
        profile.maxs.insert(feature.to_string(), max);
    }
    profile
}

/// Map every feature value to `(v - min) / (max - min)`.
pub fn normalize(
    series: &Series,
    profile: &NormalizationProfile,
    features: &[&str],
) -> Result<NormalizedSeries, AppError> {
    let ranges = features
        .iter()
        .map(|f| profile.range(f))
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::with_capacity(series.len());
    for record in series.records() {
        let mut values = Vec::with_capacity(features.len());
        for (&feature, &(min, max)) in features.iter().zip(&ranges) {
            let v = record.value(feature).ok_or_else(|| {
                AppError::shape(format!(
                    "Year {} has no value for feature '{feature}'.",
                    record.year
                ))
            })?;
            values.push(scale(v, min, max));
        }
        rows.push(NormalizedRow {
            year: record.year,
            values,
        });
    }

    Ok(NormalizedSeries {
        features: features.iter().map(|f| f.to_string()).collect(),
        rows,
    })
}

/// Exact inverse of normalization: `v * (max - min) + min`.
pub fn denormalize(v: f64, min: f64, max: f64) -> f64 {
    v * (max - min) + min
}

fn scale(v: f64, min: f64, max: f64) -> f64 {
    (v - min) / (max - min)
}

impl NormalizationProfile {
    /// The (already widened) range of a feature.
    pub fn range(&self, feature: &str) -> Result<(f64, f64), AppError> {
        match (self.mins.get(feature), self.maxs.get(feature)) {
            (Some(&min), Some(&max)) => Ok(widen(min, max)),
            _ => Err(AppError::shape(format!(
                "Normalization profile has no range for feature '{feature}'."
            ))),
        }
    }

    pub fn normalize_value(&self, feature: &str, v: f64) -> Result<f64, AppError> {
        let (min, max) = self.range(feature)?;
        Ok(scale(v, min, max))
    }

    pub fn denormalize_value(&self, feature: &str, v: f64) -> Result<f64, AppError> {
        let (min, max) = self.range(feature)?;
        Ok(denormalize(v, min, max))
    }

    /// Midpoint of a feature's range, used to fill gaps in seed windows.
    pub fn midpoint(&self, feature: &str) -> Result<f64, AppError> {
        let (min, max) = self.range(feature)?;
        Ok((min + max) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::YearRecord;

    fn series(values: &[(i32, f64)]) -> Series {
        Series::from_sorted(
            values
                .iter()
                .map(|&(y, v)| YearRecord::new(y).with("emigrants", v))
                .collect(),
        )
    }

    #[test]
    fn fit_uses_whole_series() {
        let s = series(&[(2019, 10.0), (2020, 12.0), (2021, 9.0), (2022, 14.0)]);
        let profile = fit(&s, &["emigrants"]);
        assert_eq!(profile.range("emigrants").unwrap(), (9.0, 14.0));
    }

    #[test]
    fn flat_feature_is_widened() {
        let s = series(&[(2019, 5.0), (2020, 5.0)]);
        let profile = fit(&s, &["emigrants"]);
        assert_eq!(profile.maxs["emigrants"], 6.0);
        let n = normalize(&s, &profile, &["emigrants"]).unwrap();
        assert!(n.rows.iter().all(|r| r.values[0] == 0.0));
    }

    #[test]
    fn round_trip_within_range() {
        let s = series(&[(2019, 120.0), (2020, 980.5), (2021, 431.25)]);
        let profile = fit(&s, &["emigrants"]);
        let (min, max) = profile.range("emigrants").unwrap();
        for i in 0..=50 {
            let v = min + (max - min) * i as f64 / 50.0;
            let n = profile.normalize_value("emigrants", v).unwrap();
            assert!((0.0..=1.0).contains(&n));
            let back = denormalize(n, min, max);
            assert!((back - v).abs() < 1e-9, "{v} -> {n} -> {back}");
        }
    }

    #[test]
    fn missing_feature_is_shape_error() {
        let s = series(&[(2019, 1.0)]);
        let profile = fit(&s, &["emigrants"]);
        let err = normalize(&s, &profile, &["male"]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ShapeMismatch);
    }

    #[test]
    fn widen_handles_inverted_and_nan() {
        assert_eq!(widen(3.0, 1.0), (3.0, 4.0));
        assert_eq!(widen(f64::NAN, 2.0), (0.0, 2.0));
        assert_eq!(widen(0.0, f64::INFINITY), (0.0, 1.0));
    }

    #[test]
    fn widen_never_returns_a_flat_range_for_huge_values() {
        let (min, max) = widen(1e20, 1e20);
        assert_eq!(min, 1e20);
        assert!(max > min && max.is_finite());
        assert_eq!(widen(f64::MAX, f64::MAX), (0.0, 1.0));

        let (min, max) = widen(-1e300, -1e300);
        assert!(max > min);
        let back = denormalize(scale(-1e300, min, max), min, max);
        assert!((back - -1e300).abs() <= 1e-6 * 1e300);
    }
}
