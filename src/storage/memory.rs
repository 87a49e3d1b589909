//! In-memory backend.
//!
//! Nothing outlives [`RepositoryBackend::shutdown`]. The disk backend reuses
//! this type as its cache.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;

use super::{
    BackendFactory, FileTable, LayerDescriptor, LayeringSupport, RepositoryBackend, StorageError,
    StorageResult, UnitTable,
};
use crate::types::{CompactString, FileId, Key, Persistent, UnitDescriptor, UnitId, compact_string};

pub struct MemoryBackend {
    version: u32,
    units: RwLock<UnitTable>,
    files: DashMap<UnitId, FileTable>,
    entries: DashMap<Key, Persistent>,
    hung: DashMap<Key, Persistent>,
    open: DashSet<UnitId>,
}

impl MemoryBackend {
    pub fn new(version: u32) -> Self {
        Self::with_unit_table(version, UnitTable::new())
    }

    /// Start from a previously persisted unit table.
    pub fn with_unit_table(version: u32, units: UnitTable) -> Self {
        Self {
            version,
            units: RwLock::new(units),
            files: DashMap::new(),
            entries: DashMap::new(),
            hung: DashMap::new(),
            open: DashSet::new(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_open(&self, unit: UnitId) -> bool {
        self.open.contains(&unit)
    }

    /// Number of stored entries, hung values excluded.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn hung_count(&self) -> usize {
        self.hung.len()
    }

    pub fn unit_table(&self) -> UnitTable {
        self.units.read().clone()
    }

    /// Stored entries of `unit`, sorted by key name.
    pub fn unit_entries(&self, unit: UnitId) -> Vec<(CompactString, Persistent)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.key().unit == unit)
            .map(|e| (e.key().name.clone(), e.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn file_table(&self, unit: UnitId) -> FileTable {
        self.files
            .get(&unit)
            .map(|t| t.value().clone())
            .unwrap_or_default()
    }

    /// Install data loaded from elsewhere for `unit`. Existing entries win.
    pub fn restore_unit(
        &self,
        unit: UnitId,
        files: FileTable,
        entries: impl IntoIterator<Item = (CompactString, Persistent)>,
    ) {
        self.files.entry(unit).or_insert(files);
        for (name, value) in entries {
            self.entries.entry(Key { unit, name }).or_insert(value);
        }
    }

    /// Drop stored and hung data and the file table of `unit`.
    pub fn evict_unit(&self, unit: UnitId) {
        self.entries.retain(|key, _| key.unit != unit);
        self.hung.retain(|key, _| key.unit != unit);
        self.files.remove(&unit);
    }

    pub fn contains_unit(&self, unit: UnitId) -> bool {
        self.units.read().contains(unit)
    }

    fn ensure_known(&self, unit: UnitId) -> StorageResult<()> {
        if self.contains_unit(unit) {
            Ok(())
        } else {
            Err(StorageError::UnknownUnit(unit))
        }
    }
}

impl RepositoryBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn get(&self, key: &Key) -> StorageResult<Option<Persistent>> {
        let value = self
            .entries
            .get(key)
            .or_else(|| self.hung.get(key))
            .map(|v| v.value().clone());
        Ok(value)
    }

    fn put(&self, key: Key, value: Persistent) -> StorageResult<()> {
        self.hung.remove(&key);
        self.entries.insert(key, value);
        Ok(())
    }

    fn remove(&self, key: &Key) -> StorageResult<()> {
        self.entries.remove(key);
        self.hung.remove(key);
        Ok(())
    }

    fn hang(&self, key: Key, value: Persistent) -> StorageResult<()> {
        self.hung.insert(key, value);
        Ok(())
    }

    fn open_unit(&self, unit: UnitId) -> StorageResult<()> {
        self.ensure_known(unit)?;
        if self.open.insert(unit) {
            crate::debug_event!("memory", "opened", "{unit}");
        }
        Ok(())
    }

    fn close_unit(
        &self,
        unit: UnitId,
        clean_repository: bool,
        required_units: &HashSet<UnitId>,
    ) -> StorageResult<()> {
        self.ensure_known(unit)?;
        self.open.remove(&unit);
        self.hung.retain(|key, _| key.unit != unit);

        if clean_repository && !required_units.contains(&unit) {
            self.evict_unit(unit);
            crate::debug_event!("memory", "cleaned", "{unit}");
        }
        Ok(())
    }

    fn remove_unit(&self, unit: UnitId) -> StorageResult<()> {
        self.ensure_known(unit)?;
        self.open.remove(&unit);
        self.evict_unit(unit);
        Ok(())
    }

    fn file_id_by_name(&self, unit: UnitId, file_name: &str) -> StorageResult<FileId> {
        self.ensure_known(unit)?;
        Ok(self.files.entry(unit).or_default().id_for(file_name))
    }

    fn file_name_by_id(&self, unit: UnitId, file: FileId) -> StorageResult<CompactString> {
        self.files
            .get(&unit)
            .and_then(|table| table.name(file).map(compact_string))
            .ok_or(StorageError::UnknownFile { unit, file })
    }

    fn unit_name(&self, unit: UnitId) -> StorageResult<CompactString> {
        self.units
            .read()
            .descriptor(unit)
            .map(|d| compact_string(d.name()))
            .ok_or(StorageError::UnknownUnit(unit))
    }

    fn unit_id(&self, descriptor: &UnitDescriptor) -> StorageResult<UnitId> {
        let existing = self.units.read().lookup(descriptor);
        match existing {
            Some(unit) => Ok(unit),
            None => Ok(self.units.write().id_for(descriptor)),
        }
    }

    fn lookup_unit(&self, descriptor: &UnitDescriptor) -> StorageResult<Option<UnitId>> {
        Ok(self.units.read().lookup(descriptor))
    }

    fn layering_support(&self, unit: UnitId) -> Option<LayeringSupport> {
        self.units
            .read()
            .contains(unit)
            .then(|| LayeringSupport::new(unit, vec![LayerDescriptor::memory()]))
    }

    fn shutdown(&self) -> StorageResult<()> {
        crate::debug_event!(
            "memory",
            "shutdown",
            "dropping {} entries, {} hung",
            self.entries.len(),
            self.hung.len()
        );
        self.open.clear();
        self.entries.clear();
        self.hung.clear();
        self.files.clear();
        Ok(())
    }
}

/// Creates a fresh [`MemoryBackend`] per startup.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryBackendFactory;

impl BackendFactory for MemoryBackendFactory {
    fn create_repository(&self, version: u32) -> StorageResult<Arc<dyn RepositoryBackend>> {
        Ok(Arc::new(MemoryBackend::new(version)))
    }
}
