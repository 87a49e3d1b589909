//! Storage backends behind the repository façade.
//!
//! A backend owns the actual key/value data, the unit table and the per-unit
//! file tables. The façade in [`crate::repository`] holds exactly one active
//! backend at a time and forwards every call to it.

pub mod disk;
pub mod error;
pub mod memory;
pub mod metadata;
pub mod tables;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::types::{CompactString, FileId, Key, Persistent, UnitDescriptor, UnitId};

pub use disk::{DiskBackend, DiskBackendFactory};
pub use error::{StorageError, StorageResult};
pub use memory::{MemoryBackend, MemoryBackendFactory};
pub use metadata::RepositoryMetadata;
pub use tables::{FileTable, UnitTable};

/// A storage engine the repository can forward to.
///
/// Implementations must be safe for concurrent use from any thread. The
/// repository adds no ordering between concurrent writes to the same key.
pub trait RepositoryBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    fn get(&self, key: &Key) -> StorageResult<Option<Persistent>>;

    fn put(&self, key: Key, value: Persistent) -> StorageResult<()>;

    fn remove(&self, key: &Key) -> StorageResult<()>;

    /// Store a value whose release is deferred until its unit closes.
    ///
    /// Hung values are readable through [`get`](Self::get) but are never
    /// written to durable storage.
    fn hang(&self, key: Key, value: Persistent) -> StorageResult<()>;

    fn open_unit(&self, unit: UnitId) -> StorageResult<()>;

    /// Close `unit`. Units in `required_units` must stay available, so the
    /// backend must not evict their data.
    fn close_unit(
        &self,
        unit: UnitId,
        clean_repository: bool,
        required_units: &HashSet<UnitId>,
    ) -> StorageResult<()>;

    fn remove_unit(&self, unit: UnitId) -> StorageResult<()>;

    /// Id of `file_name` inside `unit`, assigning a new one if needed.
    fn file_id_by_name(&self, unit: UnitId, file_name: &str) -> StorageResult<FileId>;

    fn file_name_by_id(&self, unit: UnitId, file: FileId) -> StorageResult<CompactString>;

    /// Like [`file_name_by_id`](Self::file_name_by_id) but never fails.
    fn file_name_by_id_safe(&self, unit: UnitId, file: FileId) -> CompactString {
        self.file_name_by_id(unit, file)
            .unwrap_or_else(|_| placeholder_file_name(unit, file))
    }

    fn unit_name(&self, unit: UnitId) -> StorageResult<CompactString>;

    /// Id of the unit backing the storage named `storage_name`.
    ///
    /// Storage units live in the local namespace.
    fn unit_id_for_storage(&self, storage_name: &str) -> StorageResult<UnitId> {
        self.unit_id(&UnitDescriptor::local(storage_name))
    }

    /// Id for `descriptor`, assigning a new one on first request.
    fn unit_id(&self, descriptor: &UnitDescriptor) -> StorageResult<UnitId>;

    /// Id already assigned to `descriptor`, if any. Never assigns.
    fn lookup_unit(&self, descriptor: &UnitDescriptor) -> StorageResult<Option<UnitId>>;

    fn layering_support(&self, unit: UnitId) -> Option<LayeringSupport>;

    /// Release everything. Called once, by the repository, before the
    /// backend is dropped.
    fn shutdown(&self) -> StorageResult<()>;
}

/// Builds a backend for a given persistence version.
pub trait BackendFactory: Send + Sync {
    fn create_repository(&self, version: u32) -> StorageResult<Arc<dyn RepositoryBackend>>;
}

/// Name returned for a file id that cannot be resolved.
pub fn placeholder_file_name(unit: UnitId, file: FileId) -> CompactString {
    format!("<unresolved {file} in {unit}>").into_boxed_str()
}

/// Where a storage layer keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerLocation {
    Memory,
    Directory(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDescriptor {
    pub location: LayerLocation,
    pub writable: bool,
}

impl LayerDescriptor {
    pub fn memory() -> Self {
        Self {
            location: LayerLocation::Memory,
            writable: true,
        }
    }

    pub fn directory(path: impl AsRef<Path>, writable: bool) -> Self {
        Self {
            location: LayerLocation::Directory(path.as_ref().to_path_buf()),
            writable,
        }
    }
}

/// Layers backing a unit's persisted data, topmost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayeringSupport {
    source_unit: UnitId,
    layers: Vec<LayerDescriptor>,
}

impl LayeringSupport {
    pub fn new(source_unit: UnitId, layers: Vec<LayerDescriptor>) -> Self {
        Self {
            source_unit,
            layers,
        }
    }

    pub fn source_unit(&self) -> UnitId {
        self.source_unit
    }

    pub fn layers(&self) -> &[LayerDescriptor] {
        &self.layers
    }

    /// First layer that accepts writes.
    pub fn writable_layer(&self) -> Option<&LayerDescriptor> {
        self.layers.iter().find(|layer| layer.writable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writable_layer_picks_first_writable() {
        let support = LayeringSupport::new(
            UnitId::new(1),
            vec![
                LayerDescriptor::directory("/opt/shared/index", false),
                LayerDescriptor::directory("/home/me/.cache/index", true),
                LayerDescriptor::memory(),
            ],
        );

        let layer = support.writable_layer().unwrap();
        assert_eq!(
            layer.location,
            LayerLocation::Directory(PathBuf::from("/home/me/.cache/index"))
        );
    }

    #[test]
    fn test_placeholder_file_name() {
        let name = placeholder_file_name(UnitId::new(2), FileId::new(9));
        assert_eq!(&*name, "<unresolved file#9 in unit#2>");
    }
}
