//! Weight initialization.

use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::AppError;

/// Glorot-normal matrix: `N(0, sqrt(2 / (fan_in + fan_out)))`.
pub(crate) fn glorot<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> Result<DMatrix<f64>, AppError> {
    let std = (2.0 / (rows + cols).max(1) as f64).sqrt();
    let normal = Normal::new(0.0, std)
        .map_err(|e| AppError::shape(format!("Invalid initializer for {rows}x{cols} weights: {e}")))?;
    Ok(DMatrix::from_fn(rows, cols, |_, _| normal.sample(&mut *rng)))
}

/// Starting value of a named parameter.
///
/// Kernels are Glorot-normal. Biases are zero, except the LSTM forget gate's
/// input bias, which starts at one.
pub(crate) fn init_param<R: Rng>(
    name: &str,
    [rows, cols]: [usize; 2],
    rng: &mut R,
) -> Result<DMatrix<f64>, AppError> {
    if name.ends_with("kernel") {
        glorot(rows, cols, rng)
    } else if name.ends_with("forget/bias") {
        Ok(DMatrix::from_element(rows, cols, 1.0))
    } else {
        Ok(DMatrix::zeros(rows, cols))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn glorot_is_seeded_and_finite() {
        let a = glorot(50, 3, &mut StdRng::seed_from_u64(7)).unwrap();
        let b = glorot(50, 3, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
        assert!(a.iter().all(|v| v.is_finite()));
        assert!(a.iter().any(|v| *v != 0.0));
    }

    #[test]
    fn only_the_forget_bias_starts_at_one() {
        let mut rng = StdRng::seed_from_u64(1);
        let forget = init_param("lstm_1/forget/bias", [4, 1], &mut rng).unwrap();
        let recurrent = init_param("lstm_1/forget/recurrent_bias", [4, 1], &mut rng).unwrap();
        let output = init_param("output/bias", [2, 1], &mut rng).unwrap();
        assert!(forget.iter().all(|v| *v == 1.0));
        assert!(recurrent.iter().chain(output.iter()).all(|v| *v == 0.0));
    }
}
