//! Model persistence.
//!
//! - keyed stores (`FileStore`, `MemoryStore`)
//! - metadata repair (`validate_metadata`)
//! - the portable export artifact
//! - the lifecycle manager tying them together

pub mod artifact;
pub mod backend;
pub mod lifecycle;
pub mod repair;

pub use artifact::{ARTIFACT_VERSION, ExportArtifact};
pub use backend::{FileStore, MemoryStore, ModelStore};
pub use lifecycle::{LifecycleManager, LoadedModel, StoreKeys};
pub use repair::{PartialMetadata, PartialRow, minimal_default, repair_metadata, validate_metadata};
