//! Shared fitting loop for both architectures.
//!
//! Each architecture implements [`Network`] as a burn module. Everything else
//! (validation split, shuffling, batching, Adam with gradient clipping, progress
//! reporting) lives here once.

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::nn::loss::{MseLoss, Reduction};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::data::Window;
use crate::domain::{EpochLog, TrainingHistory};
use crate::error::{AppError, ErrorKind};
use crate::models::tensor::{Engine, TrainEngine, device, rows_tensor, windows_tensor};

const MAX_BATCH: usize = 32;
const LEARNING_RATE: f64 = 1e-3;
const ADAM_EPSILON: f32 = 1e-7;
/// Per-tensor L2 norm cap applied before each Adam step.
const CLIP_NORM: f32 = 5.0;

/// Forward pass of an architecture: `[samples, lookback, features]` to
/// `[samples, output_width]`.
pub(crate) trait Network<B: Backend> {
    fn forward(&self, windows: Tensor<B, 3>) -> Tensor<B, 2>;
}

/// Knobs of a single `train` call.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    pub epochs: usize,
    pub validation_fraction: f64,
    /// Report progress every N epochs (the final epoch is always reported).
    pub progress_every: usize,
    pub seed: u64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            epochs: 100,
            validation_fraction: 0.2,
            progress_every: 20,
            seed: 42,
        }
    }
}

/// Callback invoked with `(epoch_index, log)` at the configured cadence.
pub type EpochCallback<'a> = &'a mut dyn FnMut(usize, &EpochLog);

/// Split sizes for `n` samples: the last `floor(n * fraction)` validate, unless
/// that would leave nothing to train on.
fn split(n: usize, fraction: f64) -> (usize, usize) {
    let fraction = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let mut val_count = (n as f64 * fraction).floor() as usize;
    if val_count >= n {
        val_count = 0;
    }
    (n - val_count, val_count)
}

/// Mean squared and mean absolute error over every element.
fn errors<B: Backend>(predicted: Tensor<B, 2>, target: Tensor<B, 2>) -> (f64, f64) {
    let diff = predicted - target;
    let mse = (diff.clone() * diff.clone()).mean().into_scalar().elem::<f64>();
    let mae = diff.abs().mean().into_scalar().elem::<f64>();
    (mse, mae)
}

/// Fit `net` and hand it back with its per-epoch history.
///
/// Validation samples are the trailing windows and are scored with dropout off.
pub(crate) fn fit_network<M>(
    mut net: M,
    windows: &[Window],
    targets: &[Vec<f64>],
    opts: &FitOptions,
    mut on_epoch: Option<EpochCallback<'_>>,
) -> Result<(M, TrainingHistory), AppError>
where
    M: AutodiffModule<TrainEngine> + Network<TrainEngine>,
    M::InnerModule: Network<Engine>,
{
    let device = device();
    let n = windows.len();
    let (train_count, val_count) = split(n, opts.validation_fraction);
    let batch_size = train_count.min(MAX_BATCH).max(1);

    info!(
        samples = n,
        train = train_count,
        validation = val_count,
        epochs = opts.epochs,
        "training regressor"
    );

    TrainEngine::seed(opts.seed);
    let mut optim = AdamConfig::new()
        .with_epsilon(ADAM_EPSILON)
        .with_grad_clipping(Some(GradientClippingConfig::Norm(CLIP_NORM)))
        .init::<TrainEngine, M>();
    let loss_fn = MseLoss::new();
    let validation = (val_count > 0).then(|| {
        (
            windows_tensor::<Engine>(&windows[train_count..], &device),
            rows_tensor::<Engine>(targets[train_count..].iter().map(Vec::as_slice), &device),
        )
    });

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut order: Vec<usize> = (0..train_count).collect();
    let mut history = TrainingHistory::default();
    let every = opts.progress_every.max(1);

    for epoch in 0..opts.epochs {
        order.shuffle(&mut rng);

        let mut loss_sum = 0.0;
        let mut mae_sum = 0.0;
        for batch in order.chunks(batch_size) {
            let x = windows_tensor::<TrainEngine>(batch.iter().map(|&i| &windows[i]), &device);
            let y = rows_tensor::<TrainEngine>(batch.iter().map(|&i| targets[i].as_slice()), &device);

            let predicted = net.forward(x);
            let mae = (predicted.clone() - y.clone())
                .abs()
                .mean()
                .into_scalar()
                .elem::<f64>();
            let loss = loss_fn.forward(predicted, y, Reduction::Mean);
            let batch_loss = loss.clone().into_scalar().elem::<f64>();

            let grads = GradientsParams::from_grads(loss.backward(), &net);
            net = optim.step(LEARNING_RATE, net, grads);

            loss_sum += batch_loss * batch.len() as f64;
            mae_sum += mae * batch.len() as f64;
        }

        let loss = loss_sum / train_count as f64;
        let mae = mae_sum / train_count as f64;
        if !loss.is_finite() {
            return Err(AppError::new(
                ErrorKind::Numeric,
                format!("Training diverged at epoch {epoch}: loss is not finite."),
            ));
        }

        let (val_loss, val_mae) = match &validation {
            Some((x, y)) => {
                let (l, a) = errors(net.valid().forward(x.clone()), y.clone());
                (Some(l), Some(a))
            }
            None => (None, None),
        };

        let log = EpochLog {
            epoch,
            loss,
            mae,
            val_loss,
            val_mae,
        };
        debug!(epoch, loss, mae, ?val_loss, "epoch finished");
        if epoch % every == 0 || epoch + 1 == opts.epochs {
            if let Some(cb) = on_epoch.as_deref_mut() {
                cb(epoch, &log);
            }
        }
        history.epochs.push(log);
    }

    Ok((net, history))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_takes_the_floor_and_never_everything() {
        assert_eq!(split(10, 0.2), (8, 2));
        assert_eq!(split(4, 0.2), (4, 0));
        assert_eq!(split(3, 1.0), (3, 0));
        assert_eq!(split(5, f64::NAN), (5, 0));
        assert_eq!(split(5, -1.0), (5, 0));
    }

    #[test]
    fn errors_average_every_element() {
        let device = device();
        let p = rows_tensor::<Engine>([[1.0, 3.0].as_slice()], &device);
        let t = rows_tensor::<Engine>([[0.0, 1.0].as_slice()], &device);
        assert_eq!(errors(p, t), (2.5, 1.5));
    }
}
