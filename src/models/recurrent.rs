//! Stacked LSTM regressor.
//!
//! Two LSTM layers of [`RECURRENT_UNITS`] units feed a linear head. The first
//! layer hands its whole sequence to the second; only the second layer's final
//! hidden state reaches the head. Windows are consumed in their 3-D
//! `[samples, lookback, features]` shape.
//!
//! Each gate holds two dense transforms, one on the input and one on the
//! previous hidden state, and each is persisted as a kernel and a bias:
//!
//! ```text
//! lstm_{n}/{gate}/kernel            [inputs, units]
//! lstm_{n}/{gate}/bias              [units, 1]
//! lstm_{n}/{gate}/recurrent_kernel  [units, units]
//! lstm_{n}/{gate}/recurrent_bias    [units, 1]
//! ```

use burn::module::Module;
use burn::nn::{Initializer, Linear, LinearConfig, Lstm, LstmConfig};
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use nalgebra::DMatrix;

use crate::models::tensor::{TrainEngine, device, linear_to_host, set_linear};
use crate::models::train::Network;

pub const RECURRENT_UNITS: usize = 50;

/// Gate order of every LSTM layer, as persisted.
const GATES: [&str; 4] = ["input", "forget", "cell", "output"];

#[derive(Module, Debug)]
pub(crate) struct RecurrentNet<B: Backend> {
    lstm_1: Lstm<B>,
    lstm_2: Lstm<B>,
    head: Linear<B>,
}

impl<B: Backend> RecurrentNet<B> {
    /// Zero-filled network; parameters are loaded afterwards.
    fn new(features: usize, outputs: usize, device: &B::Device) -> Self {
        let lstm = |inputs: usize| -> Lstm<B> {
            LstmConfig::new(inputs, RECURRENT_UNITS, true)
                .with_initializer(Initializer::Zeros)
                .init(device)
        };
        Self {
            lstm_1: lstm(features),
            lstm_2: lstm(RECURRENT_UNITS),
            head: LinearConfig::new(RECURRENT_UNITS, outputs)
                .with_initializer(Initializer::Zeros)
                .init(device),
        }
    }

    /// Every dense transform in persisted order.
    fn linears(&self) -> Vec<&Linear<B>> {
        let mut out = Vec::with_capacity(17);
        for lstm in [&self.lstm_1, &self.lstm_2] {
            for gate in [&lstm.input_gate, &lstm.forget_gate, &lstm.cell_gate, &lstm.output_gate] {
                out.push(&gate.input_transform);
                out.push(&gate.hidden_transform);
            }
        }
        out.push(&self.head);
        out
    }

    fn linears_mut(&mut self) -> Vec<&mut Linear<B>> {
        let mut out = Vec::with_capacity(17);
        for lstm in [&mut self.lstm_1, &mut self.lstm_2] {
            for gate in [
                &mut lstm.input_gate,
                &mut lstm.forget_gate,
                &mut lstm.cell_gate,
                &mut lstm.output_gate,
            ] {
                out.push(&mut gate.input_transform);
                out.push(&mut gate.hidden_transform);
            }
        }
        out.push(&mut self.head);
        out
    }
}

impl<B: Backend> Network<B> for RecurrentNet<B> {
    fn forward(&self, windows: Tensor<B, 3>) -> Tensor<B, 2> {
        let (sequence, _) = self.lstm_1.forward(windows, None);
        let (_, last) = self.lstm_2.forward(sequence, None);
        self.head.forward(last.hidden)
    }
}

/// LSTM network plus the dimensions it was built for.
#[derive(Debug, Clone)]
pub struct RecurrentStack {
    lookback: usize,
    features: usize,
    outputs: usize,
    pub(crate) net: RecurrentNet<TrainEngine>,
}

impl RecurrentStack {
    /// Parameter names and shapes. Independent of the lookback.
    pub(crate) fn layout(features: usize, outputs: usize) -> Vec<(String, [usize; 2])> {
        let mut out = Vec::with_capacity(34);
        for n in 1..=2 {
            let inputs = if n == 1 { features } else { RECURRENT_UNITS };
            for gate in GATES {
                let prefix = format!("lstm_{n}/{gate}");
                out.push((format!("{prefix}/kernel"), [inputs, RECURRENT_UNITS]));
                out.push((format!("{prefix}/bias"), [RECURRENT_UNITS, 1]));
                out.push((format!("{prefix}/recurrent_kernel"), [RECURRENT_UNITS, RECURRENT_UNITS]));
                out.push((format!("{prefix}/recurrent_bias"), [RECURRENT_UNITS, 1]));
            }
        }
        out.push(("output/kernel".to_string(), [RECURRENT_UNITS, outputs]));
        out.push(("output/bias".to_string(), [outputs, 1]));
        out
    }

    /// Network holding `params`, given in [`RecurrentStack::layout`] order.
    pub(crate) fn with_params(
        lookback: usize,
        features: usize,
        outputs: usize,
        params: &[DMatrix<f64>],
    ) -> Self {
        let device = device();
        let mut net = RecurrentNet::new(features, outputs, &device);
        for (linear, pair) in net.linears_mut().into_iter().zip(params.chunks_exact(2)) {
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
        let names = Self::layout(self.features, self.outputs);
        let params = self.net.linears().into_iter().flat_map(linear_to_host);
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
    use crate::models::init::init_param;
    use crate::models::tensor::{Engine, tensor_rows, windows_tensor};
    use burn::module::AutodiffModule;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn stack(features: usize, outputs: usize) -> RecurrentStack {
        let mut rng = StdRng::seed_from_u64(3);
        let params: Vec<_> = RecurrentStack::layout(features, outputs)
            .iter()
            .map(|(name, shape)| init_param(name, *shape, &mut rng).unwrap())
            .collect();
        RecurrentStack::with_params(3, features, outputs, &params)
    }

    #[test]
    fn layout_covers_every_gate_transform() {
        let layout = RecurrentStack::layout(2, 1);
        assert_eq!(layout.len(), 34);
        assert_eq!(layout[0], ("lstm_1/input/kernel".to_string(), [2, 50]));
        assert_eq!(layout[16].0, "lstm_2/input/kernel");
        assert_eq!(layout[16].1, [50, 50]);
        assert_eq!(layout[33], ("output/bias".to_string(), [1, 1]));
    }

    #[test]
    fn parameters_read_back_in_layout_order() {
        let s = stack(2, 2);
        let layout = RecurrentStack::layout(2, 2);
        let params = s.named_params();
        assert_eq!(params.len(), layout.len());
        for ((name, [r, c]), (got, p)) in layout.iter().zip(&params) {
            assert_eq!(name, got);
            assert_eq!((p.nrows(), p.ncols()), (*r, *c), "{name}");
        }
        assert_eq!(params[5].0, "lstm_1/forget/bias");
        assert!(params[5].1.iter().all(|v| *v == 1.0));
    }

    #[test]
    fn forward_is_one_row_per_window() {
        let s = stack(2, 1);
        let ws = [
            Window::new(vec![vec![0.1, 0.9], vec![0.4, 0.2], vec![0.7, 0.5]]),
            Window::new(vec![vec![0.3, 0.3], vec![0.6, 0.1], vec![0.2, 0.8]]),
        ];
        let out = s.net.valid().forward(windows_tensor::<Engine>(&ws, &device()));
        let rows = tensor_rows(out);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.len() == 1 && r[0].is_finite()));
    }
}
