//! Regression models.
//!
//! Two fixed burn architectures behind one contract ([`Regressor`]), a shared
//! fitting loop, and the weight codec used for persistence and export.

pub mod codec;
pub mod feedforward;
mod init;
pub mod model;
pub mod recurrent;
mod tensor;
pub mod train;

pub use codec::{SavedModel, WeightSpec, decode_weights, encode_weights};
pub use model::{Architecture, LayerSpec, Predict, Regressor};
pub use train::{EpochCallback, FitOptions};
