//! Metadata tracking for on-disk repository state

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::{StorageError, StorageResult, UnitTable};

const METADATA_FILE: &str = "repository.meta";

/// Metadata about a disk repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    /// Persistence version the data was written with
    pub version: u32,

    /// Every unit ever assigned an id, in id order
    pub units: UnitTable,

    /// Last modification timestamp (seconds since epoch, UTC)
    pub last_modified: u64,
}

impl RepositoryMetadata {
    /// Create metadata for an empty repository
    pub fn new(version: u32) -> Self {
        Self {
            version,
            units: UnitTable::new(),
            last_modified: utc_timestamp(),
        }
    }

    pub fn path(base_path: &Path) -> PathBuf {
        base_path.join(METADATA_FILE)
    }

    pub fn exists(base_path: &Path) -> bool {
        Self::path(base_path).exists()
    }

    /// Replace the unit table and bump the modification time
    pub fn update_units(&mut self, units: UnitTable) {
        self.units = units;
        self.last_modified = utc_timestamp();
    }

    /// Save metadata to file
    pub fn save(&self, base_path: &Path) -> StorageResult<()> {
        let metadata_path = Self::path(base_path);
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            StorageError::Serialization(format!("Failed to serialize metadata: {e}"))
        })?;

        fs::write(&metadata_path, json).map_err(|e| StorageError::FileWrite {
            path: metadata_path,
            source: e,
        })
    }

    /// Load metadata from file, `None` if the repository has none yet
    pub fn load(base_path: &Path) -> StorageResult<Option<Self>> {
        let metadata_path = Self::path(base_path);

        if !metadata_path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&metadata_path).map_err(|e| StorageError::FileRead {
            path: metadata_path.clone(),
            source: e,
        })?;

        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| StorageError::Corrupted {
                path: metadata_path,
                reason: e.to_string(),
            })
    }
}

pub(crate) fn utc_timestamp() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
