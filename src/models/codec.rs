//! Weight serialization.
//!
//! Parameters are written in a fixed order, each as column-major little-endian
//! `f64`, concatenated and base64-encoded. A `WeightSpec` list records name and
//! shape per tensor so a reader can validate the payload before loading it.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorKind};
use crate::models::model::{Architecture, Regressor, param_layout};

const DTYPE: &str = "float64";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightSpec {
    pub name: String,
    pub shape: [usize; 2],
    pub dtype: String,
}

/// A model as stored under its `-model` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedModel {
    pub architecture: Architecture,
    pub weight_specs: Vec<WeightSpec>,
    pub weight_data: String,
}

/// Serialize weights to `(specs, base64 payload)`.
pub fn encode_weights(model: &Regressor) -> (Vec<WeightSpec>, String) {
    let params = model.named_params();
    let mut bytes = Vec::with_capacity(params.iter().map(|(_, m)| m.len() * 8).sum());
    let specs: Vec<WeightSpec> = params
        .into_iter()
        .map(|(name, m)| {
            for v in m.iter() {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
            WeightSpec {
                name,
                shape: [m.nrows(), m.ncols()],
                dtype: DTYPE.to_string(),
            }
        })
        .collect();
    (specs, STANDARD.encode(bytes))
}

/// Rebuild a model from its architecture and an encoded payload.
///
/// Specs and payload length are checked against the architecture before any
/// weights are allocated.
pub fn decode_weights(
    arch: &Architecture,
    specs: &[WeightSpec],
    data: &str,
) -> Result<Regressor, AppError> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| AppError::new(ErrorKind::ImportFormat, format!("Invalid weight data: {e}")))?;

    let expected = param_layout(arch.kind, arch.lookback, arch.feature_count, arch.output_width)?;
    if specs.len() != expected.len() {
        return Err(AppError::shape(format!(
            "Expected {} weight tensors, got {}.",
            expected.len(),
            specs.len()
        )));
    }
    for (spec, (name, shape)) in specs.iter().zip(&expected) {
        if &spec.name != name || &spec.shape != shape {
            return Err(AppError::shape(format!(
                "Weight '{}' {:?} does not match '{}' {:?}.",
                spec.name, spec.shape, name, shape
            )));
        }
        if spec.dtype != DTYPE {
            return Err(AppError::new(
                ErrorKind::ImportFormat,
                format!("Unsupported weight dtype '{}'.", spec.dtype),
            ));
        }
    }

    let total = expected
        .iter()
        .try_fold(0usize, |acc, (_, [r, c])| r.checked_mul(*c).and_then(|n| acc.checked_add(n)))
        .and_then(|n| n.checked_mul(8))
        .ok_or_else(|| AppError::shape("Weight shapes are too large."))?;
    if bytes.len() != total {
        return Err(AppError::shape(format!(
            "Weight data holds {} bytes, expected {total}.",
            bytes.len()
        )));
    }

    let values: Vec<f64> = bytes
        .chunks_exact(8)
        .map(|c| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(c);
            f64::from_le_bytes(buf)
        })
        .collect();
    let mut offset = 0;
    let params: Vec<DMatrix<f64>> = expected
        .iter()
        .map(|(_, [r, c])| {
            let m = DMatrix::from_column_slice(*r, *c, &values[offset..offset + r * c]);
            offset += r * c;
            m
        })
        .collect();
    Ok(Regressor::with_params(arch, &params))
}

impl SavedModel {
    pub fn from_model(model: &Regressor) -> Self {
        let (weight_specs, weight_data) = encode_weights(model);
        Self {
            architecture: model.architecture(),
            weight_specs,
            weight_data,
        }
    }

    pub fn into_model(self) -> Result<Regressor, AppError> {
        decode_weights(&self.architecture, &self.weight_specs, &self.weight_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Window;
    use crate::domain::ModelKind;
    use crate::models::model::Predict;

    #[test]
    fn saved_model_reproduces_predictions() {
        for kind in ModelKind::ALL {
            let model = Regressor::build(kind, 3, 2, 2, 5).unwrap();
            let json = serde_json::to_string(&SavedModel::from_model(&model)).unwrap();
            let back: SavedModel = serde_json::from_str(&json).unwrap();
            let restored = back.into_model().unwrap();

            let w = Window::new(vec![vec![0.1, 0.5], vec![0.3, 0.2], vec![0.9, 0.4]]);
            assert_eq!(
                model.predict(&[w.clone()]).unwrap(),
                restored.predict(&[w]).unwrap()
            );
            assert_eq!(model, restored);
        }
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let model = Regressor::build(ModelKind::FeedForward, 3, 1, 1, 5).unwrap();
        let (specs, data) = encode_weights(&model);
        let mut bytes = STANDARD.decode(data).unwrap();
        bytes.truncate(bytes.len() - 8);
        let err = decode_weights(&model.architecture(), &specs, &STANDARD.encode(bytes)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
    }

    #[test]
    fn renamed_tensor_is_rejected() {
        let model = Regressor::build(ModelKind::Recurrent, 3, 1, 1, 5).unwrap();
        let (mut specs, data) = encode_weights(&model);
        specs[0].name = "lstm/kernel".into();
        assert!(decode_weights(&model.architecture(), &specs, &data).is_err());
    }

    #[test]
    fn absurd_lookback_is_rejected_before_building() {
        let model = Regressor::build(ModelKind::FeedForward, 3, 1, 1, 5).unwrap();
        let (specs, data) = encode_weights(&model);
        let mut arch = model.architecture();
        arch.lookback = 1 << 40;
        let err = decode_weights(&arch, &specs, &data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
        assert!(err.message().contains("dense_1/kernel"), "{}", err.message());

        arch.lookback = usize::MAX;
        let err = decode_weights(&arch, &specs, &data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
    }

    #[test]
    fn consistent_but_oversized_specs_are_rejected_by_length() {
        let model = Regressor::build(ModelKind::FeedForward, 3, 1, 1, 5).unwrap();
        let (mut specs, data) = encode_weights(&model);
        let mut arch = model.architecture();
        arch.lookback = 1 << 40;
        specs[0].shape = [1 << 40, 200];
        let err = decode_weights(&arch, &specs, &data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
        assert!(err.message().contains("bytes"), "{}", err.message());
    }

    #[test]
    fn garbage_base64_is_an_import_error() {
        let model = Regressor::build(ModelKind::Recurrent, 3, 1, 1, 5).unwrap();
        let (specs, _) = encode_weights(&model);
        let err = decode_weights(&model.architecture(), &specs, "@@not base64@@").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ImportFormat);
    }
}
