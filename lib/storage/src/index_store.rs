use atomicwrites::{AtomicFile, OverwriteBehavior};
use chrono::{DateTime, Utc};
use newsrag_core::{Distance, Error, IndexedRecord, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Persisted form of a vector index, pinned to the model that produced it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub format_version: u32,
    pub model_id: String,
    pub dimension: usize,
    pub distance: Distance,
    pub saved_at: DateTime<Utc>,
    /// insertion order
    pub records: Vec<IndexedRecord>,
}

impl IndexSnapshot {
    pub fn new(model_id: impl Into<String>, dimension: usize, distance: Distance, records: Vec<IndexedRecord>) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            model_id: model_id.into(),
            dimension,
            distance,
            saved_at: Utc::now(),
            records,
        }
    }
}

/// Single-file snapshot storage for the vector index
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::index(format!("create index directory: {}", e), true))?;
        }
        Ok(Self { path })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, `None` if nothing has been saved yet
    pub fn load(&self) -> Result<Option<IndexSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let data = std::fs::read(&self.path).map_err(|e| Error::index(format!("read index snapshot: {}", e), true))?;
        let snapshot: IndexSnapshot = bincode::deserialize(&data)
            .map_err(|e| Error::index(format!("index snapshot is corrupt: {}", e), false))?;

        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(Error::index(
                format!("unsupported index snapshot version {}", snapshot.format_version),
                false,
            ));
        }
        Ok(Some(snapshot))
    }

    /// Atomically replace the snapshot file
    pub fn save(&self, snapshot: &IndexSnapshot) -> Result<()> {
        let data = bincode::serialize(snapshot).map_err(|e| Error::Serialization(e.to_string()))?;

        AtomicFile::new(&self.path, OverwriteBehavior::AllowOverwrite)
            .write(|f| f.write_all(&data))
            .map_err(|e| Error::index(format!("write index snapshot: {}", e), true))?;

        debug!(records = snapshot.records.len(), bytes = data.len(), path = ?self.path, "index snapshot saved");
        Ok(())
    }
}
