//! Accuracy metrics.
//!
//! Metrics are computed over the entire actual/predicted set. Accuracy blends
//! two paths: `100 - MAPE` when MAPE is trustworthy, otherwise `R² × 100`. MAPE
//! blows up on near-zero actuals, which would otherwise report nonsense such as
//! an accuracy of `-4000%`.

use crate::domain::{Metrics, ValidationRow};
use crate::error::AppError;

/// Thresholds that decide when MAPE-based accuracy is distrusted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracyPolicy {
    /// MAPE above this switches accuracy to the R² path.
    pub mape_ceiling: f64,
    /// Minimum share of entries with a non-zero actual (usable MAPE term).
    pub min_valid_mape_fraction: f64,
}

impl Default for AccuracyPolicy {
    fn default() -> Self {
        Self {
            mape_ceiling: 500.0,
            min_valid_mape_fraction: 0.3,
        }
    }
}

/// Share of the (chronologically sorted) targets used for the validation table.
pub const VALIDATION_TAIL: f64 = 0.2;

/// Compute metrics with the default [`AccuracyPolicy`].
pub fn compute_metrics(actual: &[f64], predicted: &[f64]) -> Result<Metrics, AppError> {
    compute_metrics_with(actual, predicted, AccuracyPolicy::default())
}

pub fn compute_metrics_with(
    actual: &[f64],
    predicted: &[f64],
    policy: AccuracyPolicy,
) -> Result<Metrics, AppError> {
    if actual.len() != predicted.len() {
        return Err(AppError::shape(format!(
            "Metrics need one prediction per actual value: expected {}, got {}.",
            actual.len(),
            predicted.len()
        )));
    }
    if actual.is_empty() {
        return Ok(Metrics::default());
    }

    let n = actual.len() as f64;
    let mut abs_sum = 0.0;
    let mut sq_sum = 0.0;
    let mut mape_sum = 0.0;
    let mut mape_count = 0usize;
    for (&a, &p) in actual.iter().zip(predicted) {
        let err = a - p;
        abs_sum += err.abs();
        sq_sum += err * err;
        if a != 0.0 {
            mape_sum += (err / a).abs();
            mape_count += 1;
        }
    }

    let mae = abs_sum / n;
    let rmse = (sq_sum / n).sqrt();
    let mape = if mape_count > 0 {
        mape_sum / mape_count as f64 * 100.0
    } else {
        0.0
    };

    let mean = actual.iter().sum::<f64>() / n;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let r2 = if ss_tot == 0.0 { 1.0 } else { 1.0 - sq_sum / ss_tot };

    let distrust_mape = actual.len() < 2
        || mape > policy.mape_ceiling
        || (mape_count as f64) < n * policy.min_valid_mape_fraction;
    let accuracy = if distrust_mape {
        clamp_percent(r2 * 100.0)
    } else {
        clamp_percent(100.0 - mape.min(100.0))
    };

    Ok(Metrics {
        mae,
        rmse,
        mape,
        r2,
        accuracy,
    })
}

/// Rows for the last [`VALIDATION_TAIL`] of the targets.
///
/// `years`, `actual` and `predicted` are aligned and chronologically sorted.
pub fn validation_table(years: &[i32], actual: &[f64], predicted: &[f64]) -> Vec<ValidationRow> {
    let n = years.len().min(actual.len()).min(predicted.len());
    let start = (n as f64 * (1.0 - VALIDATION_TAIL)).floor() as usize;
    (start..n)
        .map(|i| ValidationRow {
            year: years[i],
            actual: actual[i],
            predicted: predicted[i],
            error: predicted[i] - actual[i],
        })
        .collect()
}

fn clamp_percent(v: f64) -> f64 {
    if v.is_nan() {
        return 0.0;
    }
    v.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_series_is_perfect() {
        let x = [10.0, 12.0, 9.0, 14.0, 11.0];
        let m = compute_metrics(&x, &x).unwrap();
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.r2, 1.0);
        assert_eq!(m.accuracy, 100.0);
    }

    #[test]
    fn known_values() {
        let actual = [100.0, 200.0];
        let predicted = [110.0, 180.0];
        let m = compute_metrics(&actual, &predicted).unwrap();
        assert!((m.mae - 15.0).abs() < 1e-12);
        assert!((m.rmse - 250.0_f64.sqrt()).abs() < 1e-12);
        assert!((m.mape - 10.0).abs() < 1e-12);
        // ss_tot = 5000, ss_res = 500
        assert!((m.r2 - 0.9).abs() < 1e-12);
        assert!((m.accuracy - 90.0).abs() < 1e-12);
    }

    #[test]
    fn mostly_zero_actuals_use_r2_path() {
        let actual = [0.0, 0.0, 0.0, 0.0, 1.0];
        let predicted = [0.1, 0.0, 0.2, 0.0, 0.1];
        let m = compute_metrics(&actual, &predicted).unwrap();
        // Only 20% of entries have a MAPE term.
        let expected = (m.r2 * 100.0).clamp(0.0, 100.0);
        assert_eq!(m.accuracy, expected);
        assert!((0.0..=100.0).contains(&m.accuracy));
    }

    #[test]
    fn exploding_mape_never_leaves_percent_range() {
        let actual = [0.001, 0.002, 0.001, 0.003];
        let predicted = [50.0, 60.0, 70.0, 80.0];
        let m = compute_metrics(&actual, &predicted).unwrap();
        assert!(m.mape > 500.0);
        assert_eq!(m.accuracy, 0.0);
    }

    #[test]
    fn single_sample_uses_r2_path() {
        let m = compute_metrics(&[5.0], &[4.0]).unwrap();
        // ss_tot == 0 -> r2 == 1
        assert_eq!(m.accuracy, 100.0);
    }

    #[test]
    fn policy_thresholds_are_configurable() {
        let actual = [1.0, 2.0, 4.0];
        let predicted = [2.0, 4.0, 8.0];
        let strict = AccuracyPolicy {
            mape_ceiling: 10.0,
            min_valid_mape_fraction: 0.3,
        };
        let m = compute_metrics_with(&actual, &predicted, strict).unwrap();
        assert_eq!(m.accuracy, (m.r2 * 100.0).clamp(0.0, 100.0));
        let m = compute_metrics(&actual, &predicted).unwrap();
        assert!((m.accuracy - 0.0).abs() < 1e-12, "MAPE of 100% maps to 0");
    }

    #[test]
    fn mismatched_lengths_fail() {
        let err = compute_metrics(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ShapeMismatch);
        assert_eq!(compute_metrics(&[], &[]).unwrap(), Metrics::default());
    }

    #[test]
    fn validation_table_takes_last_fifth() {
        let years: Vec<i32> = (2000..2010).collect();
        let actual: Vec<f64> = (0..10).map(f64::from).collect();
        let predicted: Vec<f64> = actual.iter().map(|v| v + 1.0).collect();
        let rows = validation_table(&years, &actual, &predicted);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].year, 2008);
        assert_eq!(rows[1].error, 1.0);
    }
}
