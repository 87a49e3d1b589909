//! Id tables for units and files.
//!
//! Ids are positions in an insertion-ordered set, so an id stays stable for
//! the lifetime of the table and is never reused.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::types::{CompactString, FileId, UnitDescriptor, UnitId, compact_string};

/// Maps unit descriptors to unit ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitTable {
    units: IndexSet<UnitDescriptor>,
}

impl UnitTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `descriptor`, assigning the next free id on first sight.
    pub fn id_for(&mut self, descriptor: &UnitDescriptor) -> UnitId {
        let index = match self.units.get_index_of(descriptor) {
            Some(index) => index,
            None => self.units.insert_full(descriptor.clone()).0,
        };
        UnitId::new(index as u32)
    }

    pub fn lookup(&self, descriptor: &UnitDescriptor) -> Option<UnitId> {
        self.units
            .get_index_of(descriptor)
            .map(|index| UnitId::new(index as u32))
    }

    pub fn descriptor(&self, unit: UnitId) -> Option<&UnitDescriptor> {
        self.units.get_index(unit.value() as usize)
    }

    pub fn contains(&self, unit: UnitId) -> bool {
        (unit.value() as usize) < self.units.len()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (UnitId, &UnitDescriptor)> {
        self.units
            .iter()
            .enumerate()
            .map(|(index, d)| (UnitId::new(index as u32), d))
    }
}

/// Maps file names to file ids within one unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileTable {
    files: IndexSet<CompactString>,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id_for(&mut self, file_name: &str) -> FileId {
        let index = match self.files.get_index_of(file_name) {
            Some(index) => index,
            None => self.files.insert_full(compact_string(file_name)).0,
        };
        FileId::new(index as u32)
    }

    pub fn name(&self, file: FileId) -> Option<&str> {
        self.files.get_index(file.value() as usize).map(|name| &**name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
