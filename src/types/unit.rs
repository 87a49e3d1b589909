//! Unit descriptors: the lookup key a backend maps to a [`UnitId`](super::UnitId).

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{CompactString, compact_string};

/// File-system namespace a unit's sources live in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileSystemRef {
    /// The default, local file system.
    Local,
    /// Any other namespace (remote host, archive, ...), keyed by display name.
    Named(CompactString),
}

impl FileSystemRef {
    pub fn named(name: &str) -> Self {
        Self::Named(compact_string(name))
    }
}

/// Identifies a logical compilation unit by name and file-system namespace.
///
/// Equality and hashing are structural over both fields. Names are case
/// sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitDescriptor {
    name: CompactString,
    file_system: FileSystemRef,
}

impl UnitDescriptor {
    pub fn new(name: &str, file_system: FileSystemRef) -> Self {
        Self {
            name: compact_string(name),
            file_system,
        }
    }

    /// Descriptor for a unit on the local file system.
    pub fn local(name: &str) -> Self {
        Self::new(name, FileSystemRef::Local)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file_system(&self) -> &FileSystemRef {
        &self.file_system
    }
}

// Debug aid only; nothing parses this back.
impl fmt::Display for UnitDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file_system {
            FileSystemRef::Local => write!(f, "{}", self.name),
            FileSystemRef::Named(ns) => write!(f, "{ns}:{}", self.name),
        }
    }
}
