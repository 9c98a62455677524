//! Feed-forward regressor.
//!
//! The window is flattened row-major to `[lookback * features]` and passed through
//! `dense 200 (tanh) -> dropout 0.2 -> dense 100 (tanh) -> dropout 0.2 -> linear`.
//! Dropout is only active on the autodiff backend, so inference is deterministic.

use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Initializer, Linear, LinearConfig};
use burn::tensor::Tensor;
use burn::tensor::activation::tanh;
use burn::tensor::backend::Backend;
use nalgebra::DMatrix;

use crate::error::AppError;
use crate::models::tensor::{TrainEngine, device, linear_to_host, set_linear};
use crate::models::train::Network;

pub const HIDDEN_1: usize = 200;
pub const HIDDEN_2: usize = 100;
pub const DROPOUT: f64 = 0.2;

#[derive(Module, Debug)]
pub(crate) struct DenseNet<B: Backend> {
    dense_1: Linear<B>,
    dense_2: Linear<B>,
    output: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> DenseNet<B> {
    fn new(inputs: usize, outputs: usize, device: &B::Device) -> Self {
        let dense = |i: usize, o: usize| -> Linear<B> {
            LinearConfig::new(i, o)
                .with_initializer(Initializer::Zeros)
                .init(device)
        };
        Self {
            dense_1: dense(inputs, HIDDEN_1),
            dense_2: dense(HIDDEN_1, HIDDEN_2),
            output: dense(HIDDEN_2, outputs),
            dropout: DropoutConfig::new(DROPOUT).init(),
        }
    }
}

impl<B: Backend> Network<B> for DenseNet<B> {
    fn forward(&self, windows: Tensor<B, 3>) -> Tensor<B, 2> {
        let [samples, lookback, features] = windows.dims();
        let x = windows.reshape([samples, lookback * features]);
        let x = self.dropout.forward(tanh(self.dense_1.forward(x)));
        let x = self.dropout.forward(tanh(self.dense_2.forward(x)));
        self.output.forward(x)
    }
}

fn shapes(inputs: usize, outputs: usize) -> Vec<(String, [usize; 2])> {
    vec![
        ("dense_1/kernel".to_string(), [inputs, HIDDEN_1]),
        ("dense_1/bias".to_string(), [HIDDEN_1, 1]),
        ("dense_2/kernel".to_string(), [HIDDEN_1, HIDDEN_2]),
        ("dense_2/bias".to_string(), [HIDDEN_2, 1]),
        ("output/kernel".to_string(), [HIDDEN_2, outputs]),
        ("output/bias".to_string(), [outputs, 1]),
    ]
}

/// Dense network plus the window shape it was built for.
#[derive(Debug, Clone)]
pub struct FeedForwardNet {
    lookback: usize,
    features: usize,
    outputs: usize,
    pub(crate) net: DenseNet<TrainEngine>,
}

impl FeedForwardNet {
    /// Parameter names and shapes. Fails when the flattened input overflows.
    pub(crate) fn layout(
        lookback: usize,
        features: usize,
        outputs: usize,
    ) -> Result<Vec<(String, [usize; 2])>, AppError> {
        let inputs = lookback.checked_mul(features).ok_or_else(|| {
            AppError::shape(format!(
                "Window of {lookback} steps by {features} features is too large."
            ))
        })?;
        Ok(shapes(inputs, outputs))
    }

    /// Network holding `params`, given in [`FeedForwardNet::layout`] order.
    pub(crate) fn with_params(
        lookback: usize,
        features: usize,
        outputs: usize,
        params: &[DMatrix<f64>],
    ) -> Self {
        let device = device();
        let mut net = DenseNet::new(lookback * features, outputs, &device);
        let linears = [&mut net.dense_1, &mut net.dense_2, &mut net.output];
        for (linear, pair) in linears.into_iter().zip(params.chunks_exact(2)) {
            set_linear(linear, &pair[0], &pair[1], &device);
        }
        Self {
            lookback,
            features,
            outputs,
            net,
        }
    }

    /// Current parameters with their persisted names.
    pub(crate) fn named_params(&self) -> Vec<(String, DMatrix<f64>)> {
        let names = shapes(self.lookback * self.features, self.outputs);
        let params = [&self.net.dense_1, &self.net.dense_2, &self.net.output]
            .into_iter()
            .flat_map(linear_to_host);
        names.into_iter().map(|(name, _)| name).zip(params).collect()
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    pub fn feature_count(&self) -> usize {
        self.features
    }

    pub fn output_width(&self) -> usize {
        self.outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Window;
    use crate::error::ErrorKind;
    use crate::models::tensor::{Engine, tensor_rows, windows_tensor};
    use burn::module::AutodiffModule;

    fn net(lookback: usize, features: usize) -> FeedForwardNet {
        let params: Vec<_> = FeedForwardNet::layout(lookback, features, 1)
            .unwrap()
            .iter()
            .map(|(_, [r, c])| DMatrix::from_fn(*r, *c, |i, j| ((i + 2 * j) % 7) as f64 / 70.0))
            .collect();
        FeedForwardNet::with_params(lookback, features, 1, &params)
    }

    #[test]
    fn oversized_window_is_rejected_without_allocating() {
        let err = FeedForwardNet::layout(usize::MAX / 2, 3, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
    }

    #[test]
    fn step_order_reaches_the_output() {
        let n = net(2, 2);
        let a = Window::new(vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
        let b = Window::new(vec![vec![0.3, 0.4], vec![0.1, 0.2]]);
        let out = n.net.valid().forward(windows_tensor::<Engine>([&a, &b], &device()));
        let rows = tensor_rows(out);
        assert_eq!(rows.len(), 2);
        assert_ne!(rows[0], rows[1]);
    }

    #[test]
    fn inference_ignores_dropout() {
        let n = net(3, 1);
        let w = Window::new(vec![vec![0.2], vec![0.5], vec![0.9]]);
        let valid = n.net.valid();
        let first = tensor_rows(valid.forward(windows_tensor::<Engine>([&w], &device())));
        let second = tensor_rows(valid.forward(windows_tensor::<Engine>([&w], &device())));
        assert_eq!(first, second);
    }

    #[test]
    fn parameters_read_back_unchanged() {
        let n = net(3, 2);
        let named = n.named_params();
        assert_eq!(named[0].0, "dense_1/kernel");
        assert_eq!(named[0].1.shape(), (6, 200));
        let params: Vec<_> = named.into_iter().map(|(_, p)| p).collect();
        let copy = FeedForwardNet::with_params(3, 2, 1, &params);
        assert_eq!(n.named_params(), copy.named_params());
    }
}
