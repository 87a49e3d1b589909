//! Directory-backed backend.
//!
//! Layout under the storage root:
//!
//! ```text
//! repository.meta        version + unit table (JSON)
//! units/<unit id>.json   file table + stored entries of one unit
//! ```
//!
//! Units are loaded lazily on first access and written back when they close
//! and at shutdown. Hung values never reach the disk. Opening a store that
//! was written with another persistence version discards its contents.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::{
    BackendFactory, FileTable, LayerDescriptor, LayeringSupport, MemoryBackend,
    RepositoryBackend, RepositoryMetadata, StorageError, StorageResult,
};
use crate::types::{CompactString, FileId, Key, Persistent, UnitDescriptor, UnitId};

const UNITS_DIR: &str = "units";

/// On-disk form of one unit.
#[derive(Debug, Serialize, Deserialize)]
struct UnitSnapshot {
    unit: UnitId,
    descriptor: UnitDescriptor,
    files: FileTable,
    entries: Vec<(CompactString, Persistent)>,
}

pub struct DiskBackend {
    root: PathBuf,
    cache: MemoryBackend,
    /// Units whose snapshot has been read into `cache` (or that had none).
    loaded: Mutex<HashSet<UnitId>>,
    /// Held shared by cache reads and writes, exclusively while units are
    /// flushed or evicted.
    gate: RwLock<()>,
}

impl DiskBackend {
    /// Open or create a store under `root` for `version`.
    pub fn open(root: impl AsRef<Path>, version: u32) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        let units_dir = root.join(UNITS_DIR);

        let metadata = match RepositoryMetadata::load(&root)? {
            Some(metadata) if metadata.version == version => metadata,
            Some(stale) => {
                tracing::warn!(
                    "[disk] discarding store at {} written with version {} (requested {version})",
                    root.display(),
                    stale.version
                );
                remove_dir_if_exists(&units_dir)?;
                RepositoryMetadata::new(version)
            }
            None => RepositoryMetadata::new(version),
        };

        fs::create_dir_all(&units_dir).map_err(|e| StorageError::FileWrite {
            path: units_dir.clone(),
            source: e,
        })?;
        metadata.save(&root)?;

        crate::log_event!(
            "disk",
            "opened",
            "{} (version {version}, {} units)",
            root.display(),
            metadata.units.len()
        );

        Ok(Self {
            root,
            cache: MemoryBackend::with_unit_table(version, metadata.units),
            loaded: Mutex::new(HashSet::new()),
            gate: RwLock::new(()),
        })
    }

    /// Units that currently have a snapshot on disk.
    pub fn persisted_units(&self) -> Vec<UnitId> {
        let table = self.cache.unit_table();
        let mut units: Vec<_> = table
            .iter()
            .map(|(unit, _)| unit)
            .filter(|unit| self.snapshot_path(*unit).exists())
            .collect();
        units.sort();
        units
    }

    fn snapshot_path(&self, unit: UnitId) -> PathBuf {
        snapshot_path(&self.root, unit)
    }

    /// Read the snapshot of `unit` into the cache once.
    ///
    /// Units without an id have nothing on disk and are never tracked, so
    /// data keyed by them stays in the cache only.
    fn ensure_loaded(&self, unit: UnitId) -> StorageResult<()> {
        let mut loaded = self.loaded.lock();
        if loaded.contains(&unit) || !self.cache.contains_unit(unit) {
            return Ok(());
        }

        if let Some(snapshot) = self.read_snapshot(unit)? {
            crate::debug_event!(
                "disk",
                "loaded",
                "{unit} ({} entries)",
                snapshot.entries.len()
            );
            self.cache.restore_unit(unit, snapshot.files, snapshot.entries);
        }
        loaded.insert(unit);
        Ok(())
    }

    fn read_snapshot(&self, unit: UnitId) -> StorageResult<Option<UnitSnapshot>> {
        let path = self.snapshot_path(unit);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path).map_err(|e| StorageError::FileRead {
            path: path.clone(),
            source: e,
        })?;
        let snapshot: UnitSnapshot =
            serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupted {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        if snapshot.unit != unit {
            return Err(StorageError::Corrupted {
                path,
                reason: format!("snapshot belongs to {}, expected {unit}", snapshot.unit),
            });
        }
        Ok(Some(snapshot))
    }

    fn write_snapshot(&self, unit: UnitId) -> StorageResult<()> {
        let descriptor = self
            .cache
            .unit_table()
            .descriptor(unit)
            .cloned()
            .ok_or(StorageError::UnknownUnit(unit))?;

        let snapshot = UnitSnapshot {
            unit,
            descriptor,
            files: self.cache.file_table(unit),
            entries: self.cache.unit_entries(unit),
        };

        let path = self.snapshot_path(unit);
        let bytes = serde_json::to_vec(&snapshot)
            .map_err(|e| StorageError::Serialization(format!("{unit}: {e}")))?;
        fs::write(&path, bytes).map_err(|e| StorageError::FileWrite { path, source: e })?;

        crate::debug_event!("disk", "flushed", "{unit} ({} entries)", snapshot.entries.len());
        Ok(())
    }

    fn delete_snapshot(&self, unit: UnitId) -> StorageResult<()> {
        let path = self.snapshot_path(unit);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::FileWrite { path, source: e }),
        }
    }

    fn save_metadata(&self) -> StorageResult<()> {
        let mut metadata = RepositoryMetadata::new(self.cache.version());
        metadata.update_units(self.cache.unit_table());
        metadata.save(&self.root)
    }
}

impl RepositoryBackend for DiskBackend {
    fn name(&self) -> &str {
        "disk"
    }

    fn get(&self, key: &Key) -> StorageResult<Option<Persistent>> {
        let _gate = self.gate.read();
        self.ensure_loaded(key.unit)?;
        self.cache.get(key)
    }

    fn put(&self, key: Key, value: Persistent) -> StorageResult<()> {
        let _gate = self.gate.read();
        self.ensure_loaded(key.unit)?;
        self.cache.put(key, value)
    }

    fn remove(&self, key: &Key) -> StorageResult<()> {
        let _gate = self.gate.read();
        self.ensure_loaded(key.unit)?;
        self.cache.remove(key)
    }

    fn hang(&self, key: Key, value: Persistent) -> StorageResult<()> {
        let _gate = self.gate.read();
        self.ensure_loaded(key.unit)?;
        self.cache.hang(key, value)
    }

    fn open_unit(&self, unit: UnitId) -> StorageResult<()> {
        let _gate = self.gate.read();
        self.cache.open_unit(unit)?;
        self.ensure_loaded(unit)
    }

    fn close_unit(
        &self,
        unit: UnitId,
        clean_repository: bool,
        required_units: &HashSet<UnitId>,
    ) -> StorageResult<()> {
        let _gate = self.gate.write();
        let keep = required_units.contains(&unit);

        if clean_repository && !keep {
            self.delete_snapshot(unit)?;
        } else if self.loaded.lock().contains(&unit) {
            self.write_snapshot(unit)?;
        }

        // Flushed or cleaned: the cache copy is no longer needed.
        self.cache.close_unit(unit, true, required_units)?;
        if !keep {
            self.loaded.lock().remove(&unit);
        }
        self.save_metadata()
    }

    fn remove_unit(&self, unit: UnitId) -> StorageResult<()> {
        let _gate = self.gate.write();
        self.cache.remove_unit(unit)?;
        self.loaded.lock().remove(&unit);
        self.delete_snapshot(unit)
    }

    fn file_id_by_name(&self, unit: UnitId, file_name: &str) -> StorageResult<FileId> {
        let _gate = self.gate.read();
        self.ensure_loaded(unit)?;
        self.cache.file_id_by_name(unit, file_name)
    }

    fn file_name_by_id(&self, unit: UnitId, file: FileId) -> StorageResult<CompactString> {
        let _gate = self.gate.read();
        self.ensure_loaded(unit)?;
        self.cache.file_name_by_id(unit, file)
    }

    fn unit_name(&self, unit: UnitId) -> StorageResult<CompactString> {
        self.cache.unit_name(unit)
    }

    fn unit_id(&self, descriptor: &UnitDescriptor) -> StorageResult<UnitId> {
        self.cache.unit_id(descriptor)
    }

    fn lookup_unit(&self, descriptor: &UnitDescriptor) -> StorageResult<Option<UnitId>> {
        self.cache.lookup_unit(descriptor)
    }

    fn layering_support(&self, unit: UnitId) -> Option<LayeringSupport> {
        self.cache.layering_support(unit)?;
        Some(LayeringSupport::new(
            unit,
            vec![
                LayerDescriptor::memory(),
                LayerDescriptor::directory(self.root.join(UNITS_DIR), true),
            ],
        ))
    }

    fn shutdown(&self) -> StorageResult<()> {
        let _gate = self.gate.write();
        let mut loaded: Vec<_> = self.loaded.lock().drain().collect();
        loaded.sort();

        // Keep going on failure so one bad unit does not lose the others.
        let mut first_error = None;
        for unit in loaded {
            if let Err(e) = self.write_snapshot(unit) {
                tracing::error!("[disk] failed to flush {unit}: {e}");
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.save_metadata() {
            first_error.get_or_insert(e);
        }
        self.cache.shutdown()?;

        crate::log_event!("disk", "shutdown", "{}", self.root.display());
        first_error.map_or(Ok(()), Err)
    }
}

/// Opens a [`DiskBackend`] rooted at a fixed directory.
#[derive(Debug, Clone)]
pub struct DiskBackendFactory {
    root: PathBuf,
}

impl DiskBackendFactory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl BackendFactory for DiskBackendFactory {
    fn create_repository(&self, version: u32) -> StorageResult<Arc<dyn RepositoryBackend>> {
        Ok(Arc::new(DiskBackend::open(&self.root, version)?))
    }
}

/// Location of the snapshot of `unit` in a store rooted at `root`.
pub fn snapshot_path(root: &Path, unit: UnitId) -> PathBuf {
    root.join(UNITS_DIR).join(format!("{}.json", unit.value()))
}

fn remove_dir_if_exists(path: &Path) -> StorageResult<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
