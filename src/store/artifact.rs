//! Portable export artifact: one JSON document holding a model and its metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ModelKind, ModelMetadata};
use crate::error::{AppError, ErrorKind};
use crate::models::{Architecture, Regressor, WeightSpec, decode_weights, encode_weights};
use crate::store::repair::{PartialMetadata, validate_metadata};

pub const ARTIFACT_VERSION: &str = "1.0";

const REQUIRED: [&str; 5] = ["modelType", "architecture", "weightData", "weightSpecs", "metadata"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportArtifact {
    pub model_type: ModelKind,
    pub version: String,
    pub export_date: DateTime<Utc>,
    pub architecture: Architecture,
    pub weight_data: String,
    pub weight_specs: Vec<WeightSpec>,
    pub metadata: ModelMetadata,
}

impl ExportArtifact {
    pub fn new(model: &Regressor, metadata: &ModelMetadata) -> Self {
        let (weight_specs, weight_data) = encode_weights(model);
        Self {
            model_type: model.kind(),
            version: ARTIFACT_VERSION.to_string(),
            export_date: Utc::now(),
            architecture: model.architecture(),
            weight_data,
            weight_specs,
            metadata: metadata.clone(),
        }
    }

    /// Parse an uploaded document.
    ///
    /// Missing required fields are reported together. The embedded metadata is
    /// repaired rather than rejected.
    pub fn from_value(v: &Value) -> Result<Self, AppError> {
        let Some(obj) = v.as_object() else {
            return Err(AppError::import_format(&REQUIRED));
        };
        let missing: Vec<&str> = REQUIRED
            .iter()
            .copied()
            .filter(|k| obj.get(*k).is_none_or(Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(AppError::import_format(&missing));
        }

        let model_type = obj["modelType"]
            .as_str()
            .and_then(ModelKind::parse_lenient)
            .ok_or_else(|| invalid("modelType", "unknown model type"))?;
        let architecture: Architecture = serde_json::from_value(obj["architecture"].clone())
            .map_err(|e| invalid("architecture", &e.to_string()))?;
        if architecture.kind != model_type {
            return Err(invalid("architecture", "kind does not match modelType"));
        }
        let weight_specs: Vec<WeightSpec> = serde_json::from_value(obj["weightSpecs"].clone())
            .map_err(|e| invalid("weightSpecs", &e.to_string()))?;
        let weight_data = obj["weightData"]
            .as_str()
            .ok_or_else(|| invalid("weightData", "expected a base64 string"))?
            .to_string();

        let mut partial = PartialMetadata::from_json(&obj["metadata"]);
        partial.align_to(&architecture);
        let metadata = validate_metadata(partial);

        Ok(Self {
            model_type,
            version: obj
                .get("version")
                .and_then(Value::as_str)
                .unwrap_or(ARTIFACT_VERSION)
                .to_string(),
            export_date: obj
                .get("exportDate")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(Utc::now),
            architecture,
            weight_data,
            weight_specs,
            metadata,
        })
    }

    /// Decode the weights into a live model, checking it agrees with the metadata.
    pub fn into_parts(self) -> Result<(Regressor, ModelMetadata), AppError> {
        let model = decode_weights(&self.architecture, &self.weight_specs, &self.weight_data)?;
        check_compatible(&model, &self.metadata)?;
        Ok((model, self.metadata))
    }
}

fn invalid(field: &str, reason: &str) -> AppError {
    AppError::new(
        ErrorKind::ImportFormat,
        format!("Invalid model artifact: field '{field}' is malformed ({reason})."),
    )
}

/// A model is usable with metadata only when their dimensions agree.
pub(crate) fn check_compatible(model: &Regressor, metadata: &ModelMetadata) -> Result<(), AppError> {
    let expected = (model.lookback(), model.feature_count(), model.output_width());
    let got = (metadata.lookback, metadata.features.len(), metadata.targets.len());
    if expected != got {
        return Err(AppError::shape(format!(
            "Model expects lookback {}, {} features and {} targets; metadata has {}, {} and {}.",
            expected.0, expected.1, expected.2, got.0, got.1, got.2
        )));
    }
    Ok(())
}
