//! Snapshot store implementations
//!
//! - [`JsonFileStore`]: one pretty-printed JSON file per document, written
//!   to a temp file and renamed into place
//! - [`MemoryStore`]: in-process map, for tests and ephemeral runs

use log::debug;
use meridian_ports::{SnapshotKind, SnapshotStore, StoreError};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open a store rooted at `dir`, creating it if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, kind: SnapshotKind) -> PathBuf {
        self.dir.join(format!("{}.json", kind.as_str()))
    }
}

/// Write to a sibling temp file then rename over `path`
pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, data)?;
    fs::rename(&temp_path, path)
}

impl SnapshotStore for JsonFileStore {
    fn save(&self, kind: SnapshotKind, document: &Value) -> Result<(), StoreError> {
        let path = self.path_for(kind);
        let data = serde_json::to_vec_pretty(document)?;
        atomic_write(&path, &data)?;
        debug!("[ENGINE] Saved {} ({} bytes)", path.display(), data.len());
        Ok(())
    }

    fn load(&self, kind: SnapshotKind) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(kind);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&raw)?))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<SnapshotKind, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

impl SnapshotStore for MemoryStore {
    fn save(&self, kind: SnapshotKind, document: &Value) -> Result<(), StoreError> {
        self.documents.write().insert(kind, document.clone());
        Ok(())
    }

    fn load(&self, kind: SnapshotKind) -> Result<Option<Value>, StoreError> {
        Ok(self.documents.read().get(&kind).cloned())
    }
}
