//! Blob-directory snapshot store.
//!
//! One flat directory of `{name}.json` blobs with the canonical pair
//! `latest` / `backup`. Writes go through a temp file and a rename so a
//! partial write is never visible under the final name; rename and remove
//! treat a missing source as success so the latest/backup shuffle is
//! idempotent.

use crate::config;
use crate::error::IndexError;
use crate::index::VectorIndex;
use crate::snapshot;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// Result of a successful snapshot write.
#[derive(Debug, Clone)]
pub struct PersistReport {
    /// Truncated SHA-256 of the payload (informational).
    pub checksum: String,
    pub size_bytes: u64,
    pub node_count: u32,
}

/// One snapshot blob on disk.
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    /// Blob name without the `.json` extension.
    pub name: String,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
}

/// Directory-level summary, newest entries first.
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub count: usize,
    pub total_bytes: u64,
    pub entries: Vec<SnapshotEntry>,
}

/// Storage contract the sync layer snapshots through.
///
/// The filesystem-backed [`GraphStore`] is the production implementation;
/// tests substitute failing decorators to exercise the rollback path.
pub trait SnapshotStore: Send + Sync {
    /// Serialize and durably write a snapshot under `name`.
    fn persist_graph(&self, index: &VectorIndex, name: &str) -> Result<PersistReport, IndexError>;
    /// Load and validate a snapshot; `None` when absent or unusable.
    fn load_graph(&self, name: &str) -> Option<VectorIndex>;
    /// Atomic rename; missing source is success.
    fn rename_file(&self, old: &str, new: &str) -> Result<(), IndexError>;
    /// Delete; missing blob is success.
    fn remove_file(&self, name: &str) -> Result<(), IndexError>;
    /// Enumerate snapshot blobs, newest first.
    fn snapshot_info(&self) -> Result<SnapshotInfo, IndexError>;
    /// Prune old snapshots; see [`GraphStore::gc_old_snapshots`].
    fn gc_old_snapshots(&self, keep: usize) -> Result<usize, IndexError>;
}

/// Filesystem-backed snapshot store over a single directory.
#[derive(Debug, Clone)]
pub struct GraphStore {
    dir: PathBuf,
}

impl GraphStore {
    /// Opens (and creates if needed) the snapshot directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{}", config::SNAPSHOT_EXT))
    }

    /// Create-or-replace write with temp-file + rename semantics.
    fn write_blob(&self, name: &str, bytes: &[u8]) -> Result<(), IndexError> {
        let path = self.blob_path(name);
        let tmp = self.dir.join(format!("{name}.{}.tmp", config::SNAPSHOT_EXT));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl SnapshotStore for GraphStore {
    fn persist_graph(&self, index: &VectorIndex, name: &str) -> Result<PersistReport, IndexError> {
        let bytes = snapshot::encode(index)?;
        let checksum = snapshot::checksum(&bytes);
        self.write_blob(name, &bytes)?;
        let report = PersistReport {
            checksum,
            size_bytes: bytes.len() as u64,
            node_count: index.node_count() as u32,
        };
        tracing::info!(
            name,
            size = report.size_bytes,
            nodes = report.node_count,
            checksum = %report.checksum,
            "snapshot persisted"
        );
        Ok(report)
    }

    fn load_graph(&self, name: &str) -> Option<VectorIndex> {
        let path = self.blob_path(name);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(name, error = %e, "snapshot read failed");
                return None;
            }
        };
        let index = match snapshot::decode(&bytes) {
            Ok(idx) => idx,
            Err(e) => {
                tracing::warn!(name, error = %e, "snapshot decode failed");
                return None;
            }
        };
        if let Err(e) = index.validate() {
            tracing::warn!(name, error = %e, "snapshot failed validation");
            return None;
        }
        tracing::info!(name, nodes = index.node_count(), live = index.live_count(), "snapshot loaded");
        Some(index)
    }

    fn rename_file(&self, old: &str, new: &str) -> Result<(), IndexError> {
        match fs::rename(self.blob_path(old), self.blob_path(new)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn remove_file(&self, name: &str) -> Result<(), IndexError> {
        match fs::remove_file(self.blob_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn snapshot_info(&self) -> Result<SnapshotInfo, IndexError> {
        let mut entries = Vec::new();
        let mut total_bytes = 0u64;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some(config::SNAPSHOT_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let md = entry.metadata()?;
            let modified: DateTime<Utc> = md.modified()?.into();
            total_bytes += md.len();
            entries.push(SnapshotEntry {
                name: stem.to_string(),
                size_bytes: md.len(),
                modified,
            });
        }
        entries.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(SnapshotInfo {
            count: entries.len(),
            total_bytes,
            entries,
        })
    }

    /// With `keep == 0`, retain only the canonical `latest` / `backup`
    /// pair by name; otherwise retain the `keep` newest blobs by mtime.
    /// Returns the number of blobs deleted.
    fn gc_old_snapshots(&self, keep: usize) -> Result<usize, IndexError> {
        let info = self.snapshot_info()?;
        let mut removed = 0usize;
        if keep == 0 {
            for entry in &info.entries {
                if entry.name != config::SNAPSHOT_LATEST && entry.name != config::SNAPSHOT_BACKUP {
                    self.remove_file(&entry.name)?;
                    removed += 1;
                }
            }
        } else {
            for entry in info.entries.iter().skip(keep) {
                self.remove_file(&entry.name)?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(removed, keep, "pruned old snapshots");
        }
        Ok(removed)
    }
}
