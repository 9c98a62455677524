//! Read/write export artifact files.
//!
//! The artifact is the portable representation of one trained model; its
//! schema is defined by `store::ExportArtifact`.

use std::fs::File;
use std::path::Path;

use serde_json::Value;

use crate::error::AppError;
use crate::store::ExportArtifact;

/// Write an artifact as pretty-printed JSON.
pub fn write_artifact(path: &Path, artifact: &ExportArtifact) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create artifact '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, artifact)
        .map_err(|e| AppError::io(format!("Failed to write artifact: {e}")))?;
    Ok(())
}

/// Read an artifact, reporting every missing required field at once.
pub fn read_artifact(path: &Path) -> Result<ExportArtifact, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open artifact '{}': {e}", path.display())))?;
    let value: Value = serde_json::from_reader(file)
        .map_err(|e| AppError::io(format!("Artifact '{}' is not valid JSON: {e}", path.display())))?;
    ExportArtifact::from_value(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModelKind;
    use crate::error::ErrorKind;
    use crate::models::Regressor;
    use crate::store::minimal_default;

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let model = Regressor::build(ModelKind::Recurrent, 3, 1, 1, 2).unwrap();
        let artifact = ExportArtifact::new(&model, &minimal_default());
        write_artifact(&path, &artifact).unwrap();
        assert_eq!(read_artifact(&path).unwrap(), artifact);
    }

    #[test]
    fn incomplete_file_is_import_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"modelType": "recurrent"}"#).unwrap();
        let err = read_artifact(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ImportFormat);
        assert!(err.message().contains("weightData"));
    }
}
