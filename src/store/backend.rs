//! Keyed model stores.
//!
//! A store maps string keys to JSON documents. `get` returning `Ok(None)` means
//! "not found"; errors are reserved for I/O failures.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind as IoKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::AppError;

pub trait ModelStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    fn put(&mut self, key: &str, value: &str) -> Result<(), AppError>;
    /// Remove a key. Returns whether it existed.
    fn delete(&mut self, key: &str) -> Result<bool, AppError>;
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            AppError::io(format!("Failed to create store directory {}: {e}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl ModelStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == IoKind::NotFound => Ok(None),
            Err(e) => Err(AppError::io(format!("Failed to read {}: {e}", path.display()))),
        }
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), AppError> {
        let path = self.path_for(key);
        // Write to a sibling file, then rename over the target.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)
            .map_err(|e| AppError::io(format!("Failed to write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &path)
            .map_err(|e| AppError::io(format!("Failed to write {}: {e}", path.display())))?;
        debug!(key, path = %path.display(), "stored entry");
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool, AppError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == IoKind::NotFound => Ok(false),
            Err(e) => Err(AppError::io(format!("Failed to delete {}: {e}", path.display()))),
        }
    }
}

/// In-process store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ModelStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), AppError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool, AppError> {
        Ok(self.entries.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let mut s = MemoryStore::new();
        assert_eq!(s.get("a").unwrap(), None);
        s.put("a", "{}").unwrap();
        assert_eq!(s.get("a").unwrap().as_deref(), Some("{}"));
        assert!(s.delete("a").unwrap());
        assert!(!s.delete("a").unwrap());
        assert!(s.is_empty());
    }

    #[test]
    fn file_store_sanitizes_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("models");
        let mut s = FileStore::open(&dir).unwrap();
        s.put("emigrants-recurrent-total-model", "1").unwrap();
        s.put("a/b:c", "2").unwrap();
        assert!(dir.join("emigrants-recurrent-total-model.json").exists());
        assert!(dir.join("a_b_c.json").exists());
        assert_eq!(s.get("a/b:c").unwrap().as_deref(), Some("2"));
        assert_eq!(s.get("missing").unwrap(), None);
        assert!(s.delete("a/b:c").unwrap());
    }
}
