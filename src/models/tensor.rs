//! Host values in and out of the tensor backend.
//!
//! Training runs on `Autodiff<NdArray<f64>>`; inference on the plain backend.
//! Parameters travel as `nalgebra` matrices so seeding and the weight codec stay
//! independent of the backend.

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use burn::module::Param;
use burn::nn::Linear;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use nalgebra::DMatrix;

use crate::data::Window;

pub(crate) type Engine = NdArray<f64>;
pub(crate) type TrainEngine = Autodiff<Engine>;

pub(crate) fn device() -> NdArrayDevice {
    NdArrayDevice::Cpu
}

/// Stack windows into `[samples, lookback, features]`. Shapes are checked by the caller.
pub(crate) fn windows_tensor<'a, B: Backend>(
    windows: impl IntoIterator<Item = &'a Window>,
    device: &B::Device,
) -> Tensor<B, 3> {
    let (mut count, mut lookback, mut features) = (0, 0, 0);
    let mut values = Vec::new();
    for w in windows {
        lookback = w.lookback();
        features = w.feature_count();
        values.extend(w.rows().iter().flatten().copied());
        count += 1;
    }
    Tensor::from_data(TensorData::new(values, [count, lookback, features]), device)
}

/// Stack equal-width rows into `[rows, width]`.
pub(crate) fn rows_tensor<'a, B: Backend>(
    rows: impl IntoIterator<Item = &'a [f64]>,
    device: &B::Device,
) -> Tensor<B, 2> {
    let (mut count, mut width) = (0, 0);
    let mut values = Vec::new();
    for row in rows {
        width = row.len();
        values.extend_from_slice(row);
        count += 1;
    }
    Tensor::from_data(TensorData::new(values, [count, width]), device)
}

pub(crate) fn tensor_rows<B: Backend>(t: Tensor<B, 2>) -> Vec<Vec<f64>> {
    let [_, width] = t.dims();
    let values = values(t);
    values.chunks(width.max(1)).map(<[f64]>::to_vec).collect()
}

fn values<B: Backend, const D: usize>(t: Tensor<B, D>) -> Vec<f64> {
    t.into_data().iter::<f64>().collect()
}

/// Kernel `[inputs, outputs]` and bias `[outputs, 1]` of a dense transform.
pub(crate) fn linear_to_host<B: Backend>(linear: &Linear<B>) -> [DMatrix<f64>; 2] {
    let weight = linear.weight.val();
    let [inputs, outputs] = weight.dims();
    let kernel = DMatrix::from_row_slice(inputs, outputs, &values(weight));
    let bias = match &linear.bias {
        Some(b) => DMatrix::from_column_slice(outputs, 1, &values(b.val())),
        None => DMatrix::zeros(outputs, 1),
    };
    [kernel, bias]
}

pub(crate) fn set_linear<B: Backend>(
    linear: &mut Linear<B>,
    kernel: &DMatrix<f64>,
    bias: &DMatrix<f64>,
    device: &B::Device,
) {
    // nalgebra is column-major; the backend wants rows.
    let weight = TensorData::new(
        kernel.transpose().as_slice().to_vec(),
        [kernel.nrows(), kernel.ncols()],
    );
    linear.weight = Param::from_tensor(Tensor::from_data(weight, device));
    let bias = TensorData::new(bias.as_slice().to_vec(), [bias.len()]);
    linear.bias = Some(Param::from_tensor(Tensor::from_data(bias, device)));
}
