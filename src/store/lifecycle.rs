//! Model lifecycle: save, restore, delete, export and import.
//!
//! Each purpose owns two keys: `<prefix><purpose>-model` (architecture plus
//! weights) and `<prefix><purpose>-metadata`. A model without metadata is a load
//! failure. Metadata is always repaired on the way in.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::{ModelKind, ModelMetadata, Purpose};
use crate::error::{AppError, ErrorKind};
use crate::models::{Regressor, SavedModel};
use crate::store::artifact::{ExportArtifact, check_compatible};
use crate::store::backend::ModelStore;
use crate::store::repair::{PartialMetadata, validate_metadata};

/// Key layout of one family of saved models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKeys {
    pub prefix: String,
}

impl StoreKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Keys of one architecture: `emigrants-<kind>-`.
    pub fn for_kind(kind: ModelKind) -> Self {
        Self::new(format!("emigrants-{}-", kind.slug()))
    }

    pub fn model_key(&self, purpose: Purpose) -> String {
        format!("{}{}-model", self.prefix, purpose)
    }

    pub fn metadata_key(&self, purpose: Purpose) -> String {
        format!("{}{}-metadata", self.prefix, purpose)
    }
}

/// A restored model ready for forecasting.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedModel {
    pub model: Regressor,
    pub metadata: ModelMetadata,
}

pub struct LifecycleManager<S: ModelStore> {
    store: S,
    keys: StoreKeys,
}

impl<S: ModelStore> LifecycleManager<S> {
    pub fn new(store: S, keys: StoreKeys) -> Self {
        Self { store, keys }
    }

    pub fn keys(&self) -> &StoreKeys {
        &self.keys
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn save(
        &mut self,
        purpose: Purpose,
        model: &Regressor,
        metadata: &ModelMetadata,
    ) -> Result<(), AppError> {
        check_compatible(model, metadata)?;
        let saved = to_json(&SavedModel::from_model(model))?;
        let meta = to_json(metadata)?;
        self.store.put(&self.keys.model_key(purpose), &saved)?;
        self.store.put(&self.keys.metadata_key(purpose), &meta)?;
        info!(%purpose, prefix = %self.keys.prefix, "saved model");
        Ok(())
    }

    /// Load one purpose. A missing key is a `PersistenceMiss` error.
    pub fn load(&self, purpose: Purpose) -> Result<LoadedModel, AppError> {
        let model_key = self.keys.model_key(purpose);
        let meta_key = self.keys.metadata_key(purpose);
        let saved = self
            .store
            .get(&model_key)?
            .ok_or_else(|| AppError::missing_key(&model_key))?;
        let meta = self
            .store
            .get(&meta_key)?
            .ok_or_else(|| AppError::missing_key(&meta_key))?;

        let saved: SavedModel = serde_json::from_str(&saved)
            .map_err(|e| AppError::io(format!("Saved model '{model_key}' is unreadable: {e}")))?;
        let model = saved.into_model()?;

        let meta: Value = serde_json::from_str(&meta)
            .map_err(|e| AppError::io(format!("Saved metadata '{meta_key}' is unreadable: {e}")))?;
        let mut partial = PartialMetadata::from_json(&meta);
        partial.align_to(&model.architecture());
        let metadata = validate_metadata(partial);
        check_compatible(&model, &metadata)?;

        Ok(LoadedModel { model, metadata })
    }

    /// Restore every purpose that has a usable saved model.
    ///
    /// Missing purposes are skipped silently; unreadable ones are skipped with
    /// a warning.
    pub fn restore_all(&self) -> BTreeMap<Purpose, LoadedModel> {
        let mut out = BTreeMap::new();
        for purpose in Purpose::ALL {
            match self.load(purpose) {
                Ok(loaded) => {
                    out.insert(purpose, loaded);
                }
                Err(e) if e.kind() == ErrorKind::PersistenceMiss => {
                    debug!(%purpose, "no saved model");
                }
                Err(e) => {
                    warn!(%purpose, error = %e, "saved model could not be restored");
                }
            }
        }
        info!(restored = out.len(), prefix = %self.keys.prefix, "restored saved models");
        out
    }

    /// Delete both keys of every purpose. Returns how many entries existed.
    pub fn delete_all(&mut self) -> Result<usize, AppError> {
        let mut removed = 0;
        for purpose in Purpose::ALL {
            for key in [self.keys.model_key(purpose), self.keys.metadata_key(purpose)] {
                if self.store.delete(&key)? {
                    removed += 1;
                }
            }
        }
        info!(removed, prefix = %self.keys.prefix, "deleted saved models");
        Ok(removed)
    }

    pub fn export(&self, purpose: Purpose) -> Result<ExportArtifact, AppError> {
        let loaded = self.load(purpose)?;
        Ok(ExportArtifact::new(&loaded.model, &loaded.metadata))
    }

    /// Turn an uploaded artifact into a live model and persist it under `purpose`.
    pub fn import(&mut self, purpose: Purpose, artifact: ExportArtifact) -> Result<LoadedModel, AppError> {
        let (model, metadata) = artifact.into_parts()?;
        self.save(purpose, &model, &metadata)?;
        Ok(LoadedModel { model, metadata })
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string(value).map_err(|e| AppError::io(format!("Failed to serialize: {e}")))
}
