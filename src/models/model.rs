//! The regressor contract shared by both architectures.
//!
//! [`Regressor`] is a tagged variant: callers build, train and predict without
//! caring which architecture sits behind it. Shape checks live here so each
//! network can assume well-formed input.

use burn::module::AutodiffModule;
use nalgebra::DMatrix;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::Window;
use crate::domain::{ModelKind, TrainingHistory};
use crate::error::{AppError, ErrorKind};
use crate::models::feedforward::{DROPOUT, FeedForwardNet, HIDDEN_1, HIDDEN_2};
use crate::models::init::init_param;
use crate::models::recurrent::{RECURRENT_UNITS, RecurrentStack};
use crate::models::tensor::{Engine, TrainEngine, device, tensor_rows, windows_tensor};
use crate::models::train::{EpochCallback, FitOptions, Network, fit_network};

/// Anything that maps windows to rows of normalized predictions.
pub trait Predict {
    fn predict(&self, windows: &[Window]) -> Result<Vec<Vec<f64>>, AppError>;
}

/// Description of one layer, as recorded in saved models and artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSpec {
    pub name: String,
    pub layer_type: String,
    pub units: usize,
    pub activation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropout: Option<f64>,
}

/// Topology of a built model. Enough to rebuild an untrained twin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Architecture {
    pub kind: ModelKind,
    pub lookback: usize,
    pub feature_count: usize,
    pub output_width: usize,
    pub layers: Vec<LayerSpec>,
}

fn layer(name: &str, layer_type: &str, units: usize, activation: &str, dropout: Option<f64>) -> LayerSpec {
    LayerSpec {
        name: name.to_string(),
        layer_type: layer_type.to_string(),
        units,
        activation: activation.to_string(),
        dropout,
    }
}

/// Parameter names and shapes for a model of these dimensions.
///
/// Computed without building anything, so untrusted dimensions can be checked
/// before any weights are allocated.
pub(crate) fn param_layout(
    kind: ModelKind,
    lookback: usize,
    feature_count: usize,
    output_width: usize,
) -> Result<Vec<(String, [usize; 2])>, AppError> {
    if lookback == 0 || feature_count == 0 {
        return Err(AppError::shape(format!(
            "Cannot build a model with lookback {lookback} and {feature_count} features."
        )));
    }
    if !(1..=2).contains(&output_width) {
        return Err(AppError::shape(format!(
            "Output width must be 1 or 2, got {output_width}."
        )));
    }
    match kind {
        ModelKind::Recurrent => Ok(RecurrentStack::layout(feature_count, output_width)),
        ModelKind::FeedForward => FeedForwardNet::layout(lookback, feature_count, output_width),
    }
}

#[derive(Debug, Clone)]
pub enum Regressor {
    Recurrent(RecurrentStack),
    FeedForward(FeedForwardNet),
}

impl Regressor {
    /// Build an untrained model with seeded weights.
    pub fn build(
        kind: ModelKind,
        lookback: usize,
        feature_count: usize,
        output_width: usize,
        seed: u64,
    ) -> Result<Self, AppError> {
        let layout = param_layout(kind, lookback, feature_count, output_width)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let params = layout
            .iter()
            .map(|(name, shape)| init_param(name, *shape, &mut rng))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::assemble(kind, lookback, feature_count, output_width, &params))
    }

    /// Build an untrained model matching a recorded architecture.
    pub fn from_architecture(arch: &Architecture) -> Result<Self, AppError> {
        Self::build(arch.kind, arch.lookback, arch.feature_count, arch.output_width, 0)
    }

    /// Model holding `params`, already checked against [`param_layout`].
    pub(crate) fn with_params(arch: &Architecture, params: &[DMatrix<f64>]) -> Self {
        Self::assemble(arch.kind, arch.lookback, arch.feature_count, arch.output_width, params)
    }

    fn assemble(
        kind: ModelKind,
        lookback: usize,
        feature_count: usize,
        output_width: usize,
        params: &[DMatrix<f64>],
    ) -> Self {
        match kind {
            ModelKind::Recurrent => Regressor::Recurrent(RecurrentStack::with_params(
                lookback,
                feature_count,
                output_width,
                params,
            )),
            ModelKind::FeedForward => Regressor::FeedForward(FeedForwardNet::with_params(
                lookback,
                feature_count,
                output_width,
                params,
            )),
        }
    }

    /// Current parameters with their portable names, in layout order.
    pub(crate) fn named_params(&self) -> Vec<(String, DMatrix<f64>)> {
        match self {
            Regressor::Recurrent(n) => n.named_params(),
            Regressor::FeedForward(n) => n.named_params(),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Regressor::Recurrent(_) => ModelKind::Recurrent,
            Regressor::FeedForward(_) => ModelKind::FeedForward,
        }
    }

    pub fn lookback(&self) -> usize {
        match self {
            Regressor::Recurrent(n) => n.lookback(),
            Regressor::FeedForward(n) => n.lookback(),
        }
    }

    pub fn feature_count(&self) -> usize {
        match self {
            Regressor::Recurrent(n) => n.feature_count(),
            Regressor::FeedForward(n) => n.feature_count(),
        }
    }

    pub fn output_width(&self) -> usize {
        match self {
            Regressor::Recurrent(n) => n.output_width(),
            Regressor::FeedForward(n) => n.output_width(),
        }
    }

    pub fn architecture(&self) -> Architecture {
        let layers = match self {
            Regressor::Recurrent(_) => vec![
                layer("lstm_1", "lstm", RECURRENT_UNITS, "tanh", None),
                layer("lstm_2", "lstm", RECURRENT_UNITS, "tanh", None),
                layer("output", "dense", self.output_width(), "linear", None),
            ],
            Regressor::FeedForward(_) => vec![
                layer("dense_1", "dense", HIDDEN_1, "tanh", Some(DROPOUT)),
                layer("dense_2", "dense", HIDDEN_2, "tanh", Some(DROPOUT)),
                layer("output", "dense", self.output_width(), "linear", None),
            ],
        };
        Architecture {
            kind: self.kind(),
            lookback: self.lookback(),
            feature_count: self.feature_count(),
            output_width: self.output_width(),
            layers,
        }
    }

    /// Fit the model in place.
    ///
    /// Windows are `[samples, lookback, features]`; targets `[samples, output_width]`.
    pub fn train(
        &mut self,
        windows: &[Window],
        targets: &[Vec<f64>],
        opts: &FitOptions,
        on_epoch: Option<EpochCallback<'_>>,
    ) -> Result<TrainingHistory, AppError> {
        if windows.is_empty() || targets.is_empty() {
            return Err(AppError::shape("Cannot train on an empty window set."));
        }
        if windows.len() != targets.len() {
            return Err(AppError::shape(format!(
                "Got {} windows but {} targets.",
                windows.len(),
                targets.len()
            )));
        }
        self.check_windows(windows)?;
        let width = self.output_width();
        if let Some(bad) = targets.iter().find(|t| t.len() != width) {
            return Err(AppError::shape(format!(
                "Expected targets of width {width}, got {}.",
                bad.len()
            )));
        }

        info!(kind = self.kind().slug(), samples = windows.len(), "fitting model");
        match self {
            Regressor::Recurrent(n) => {
                let (net, history) = fit_network(n.net.clone(), windows, targets, opts, on_epoch)?;
                n.net = net;
                Ok(history)
            }
            Regressor::FeedForward(n) => {
                let (net, history) = fit_network(n.net.clone(), windows, targets, opts, on_epoch)?;
                n.net = net;
                Ok(history)
            }
        }
    }

    /// Check that every window is `lookback × feature_count` and not ragged.
    fn check_windows(&self, windows: &[Window]) -> Result<(), AppError> {
        let (lookback, features) = (self.lookback(), self.feature_count());
        for (i, w) in windows.iter().enumerate() {
            if w.lookback() == 0 || w.feature_count() == 0 {
                return Err(AppError::shape(format!(
                    "Window {i} has no rows or no features."
                )));
            }
            if w.rows().iter().any(|r| r.len() != w.feature_count()) {
                return Err(AppError::shape(format!("Window {i} has ragged rows.")));
            }
            if w.lookback() != lookback || w.feature_count() != features {
                return Err(AppError::shape(format!(
                    "Expected windows of shape [{lookback}, {features}], got [{}, {}].",
                    w.lookback(),
                    w.feature_count()
                )));
            }
        }
        Ok(())
    }
}

/// Equal when the architectures and every parameter match.
impl PartialEq for Regressor {
    fn eq(&self, other: &Self) -> bool {
        self.architecture() == other.architecture() && self.named_params() == other.named_params()
    }
}

/// Inference pass with dropout off.
fn run_forward<M>(net: &M, windows: &[Window]) -> Vec<Vec<f64>>
where
    M: AutodiffModule<TrainEngine>,
    M::InnerModule: Network<Engine>,
{
    let device = device();
    tensor_rows(net.valid().forward(windows_tensor::<Engine>(windows, &device)))
}

impl Predict for Regressor {
    fn predict(&self, windows: &[Window]) -> Result<Vec<Vec<f64>>, AppError> {
        if windows.is_empty() {
            return Ok(Vec::new());
        }
        self.check_windows(windows)?;

        let rows = match self {
            Regressor::Recurrent(n) => run_forward(&n.net, windows),
            Regressor::FeedForward(n) => run_forward(&n.net, windows),
        };
        if rows.iter().flatten().any(|v| !v.is_finite()) {
            return Err(AppError::new(
                ErrorKind::Numeric,
                "Model produced a non-finite prediction.",
            ));
        }
        Ok(rows)
    }
}
