//! Repository façade over a swappable storage backend.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized --startup(v)--> Active(v) --shutdown--> ShutDown
//!                                  ^                        |
//!                                  +-------startup(v')------+
//! ```
//!
//! The active state lives behind an atomic pointer, so data operations never
//! take a lock. `startup` and `shutdown` are serialized by a dedicated mutex.
//! While no backend is active, `get` answers `None` and writes are dropped;
//! unit operations and id lookups fail with [`RepositoryError::NotStarted`]
//! or [`RepositoryError::ShutDown`].

mod builder;
mod error;
pub mod listeners;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::storage::{BackendFactory, LayeringSupport, RepositoryBackend, placeholder_file_name};
use crate::types::{CompactString, FileId, Key, Persistent, UnitDescriptor, UnitId};

pub use builder::RepositoryBuilder;
pub use error::{RepositoryError, RepositoryResult};
pub use listeners::{RepositoryListener, RepositoryListenersManager, TracingListener};

/// Which backend, if any, the repository currently forwards to.
#[derive(Clone)]
pub enum BackendState {
    Uninitialized,
    Active {
        version: u32,
        backend: Arc<dyn RepositoryBackend>,
    },
    ShutDown,
}

impl BackendState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Active { .. } => "active",
            Self::ShutDown => "shut down",
        }
    }

    fn inactive_error(&self) -> RepositoryError {
        match self {
            Self::ShutDown => RepositoryError::ShutDown,
            _ => RepositoryError::NotStarted,
        }
    }
}

impl fmt::Debug for BackendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active { version, backend } => f
                .debug_struct("Active")
                .field("version", version)
                .field("backend", &backend.name())
                .finish(),
            other => f.write_str(other.name()),
        }
    }
}

pub struct Repository {
    state: ArcSwap<BackendState>,
    lifecycle: Mutex<()>,
    factory: Arc<dyn BackendFactory>,
    listeners: Arc<RepositoryListenersManager>,
}

impl Repository {
    pub fn new(factory: Arc<dyn BackendFactory>, listeners: Arc<RepositoryListenersManager>) -> Self {
        Self {
            state: ArcSwap::from_pointee(BackendState::Uninitialized),
            lifecycle: Mutex::new(()),
            factory,
            listeners,
        }
    }

    pub fn builder() -> RepositoryBuilder {
        RepositoryBuilder::new()
    }

    pub fn listeners(&self) -> &Arc<RepositoryListenersManager> {
        &self.listeners
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> Arc<BackendState> {
        self.state.load_full()
    }

    /// Active persistence version, `None` unless started.
    pub fn version(&self) -> Option<u32> {
        match &**self.state.load() {
            BackendState::Active { version, .. } => Some(*version),
            _ => None,
        }
    }

    /// Name of the current state, for logs and status output.
    pub fn state_name(&self) -> &'static str {
        self.state.load().name()
    }

    pub fn is_active(&self) -> bool {
        matches!(&**self.state.load(), BackendState::Active { .. })
    }

    /// Install a backend built for `version`.
    ///
    /// Repeating the call with the active version is a no-op. A different
    /// version fails until [`shutdown`](Self::shutdown) has run.
    pub fn startup(&self, version: i32) -> RepositoryResult<()> {
        let version = u32::try_from(version).map_err(|_| RepositoryError::InvalidVersion(version))?;
        let _lifecycle = self.lifecycle.lock();

        if let BackendState::Active { version: active, .. } = &**self.state.load() {
            return if *active == version {
                Ok(())
            } else {
                Err(RepositoryError::VersionMismatch {
                    active: *active,
                    requested: version,
                })
            };
        }

        let backend = self.factory.create_repository(version)?;
        crate::log_event!("repository", "started", "{} backend, version {version}", backend.name());
        self.state.store(Arc::new(BackendState::Active { version, backend }));
        Ok(())
    }

    /// Shut the active backend down. No-op unless started.
    ///
    /// The repository ends up shut down even when the backend hook fails or
    /// panics; the hook's error is still returned.
    pub fn shutdown(&self) -> RepositoryResult<()> {
        let _lifecycle = self.lifecycle.lock();

        let current = self.state.load_full();
        let BackendState::Active { backend, .. } = &*current else {
            return Ok(());
        };

        let _reset = ShutDownOnDrop(&self.state);
        backend.shutdown()?;
        crate::log_event!("repository", "shutdown", "{} backend", backend.name());
        Ok(())
    }

    fn backend(&self) -> RepositoryResult<Arc<dyn RepositoryBackend>> {
        match &**self.state.load() {
            BackendState::Active { backend, .. } => Ok(backend.clone()),
            inactive => Err(inactive.inactive_error()),
        }
    }

    /// Backend for data operations, `None` (and logged) when inactive.
    fn data_backend(&self, operation: &str, key: &Key) -> Option<Arc<dyn RepositoryBackend>> {
        match &**self.state.load() {
            BackendState::Active { backend, .. } => Some(backend.clone()),
            inactive => {
                crate::debug_event!("repository", "ignored", "{operation} {key} while {}", inactive.name());
                None
            }
        }
    }

    pub fn get(&self, key: &Key) -> RepositoryResult<Option<Persistent>> {
        match self.data_backend("get", key) {
            Some(backend) => Ok(backend.get(key)?),
            None => Ok(None),
        }
    }

    pub fn put(&self, key: Key, value: Persistent) -> RepositoryResult<()> {
        match self.data_backend("put", &key) {
            Some(backend) => Ok(backend.put(key, value)?),
            None => Ok(()),
        }
    }

    pub fn remove(&self, key: &Key) -> RepositoryResult<()> {
        match self.data_backend("remove", key) {
            Some(backend) => Ok(backend.remove(key)?),
            None => Ok(()),
        }
    }

    /// Store a value whose release is deferred until its unit closes.
    pub fn hang(&self, key: Key, value: Persistent) -> RepositoryResult<()> {
        match self.data_backend("hang", &key) {
            Some(backend) => Ok(backend.hang(key, value)?),
            None => Ok(()),
        }
    }

    /// Open `unit` in the backend, then notify listeners.
    ///
    /// A listener veto is only logged; the unit stays open.
    pub fn open_unit(&self, unit: UnitId) -> RepositoryResult<()> {
        self.backend()?.open_unit(unit)?;
        if !self.listeners.fire_unit_opened_event(unit) {
            crate::debug_event!("repository", "open vetoed", "{unit} stays open");
        }
        Ok(())
    }

    /// Close `unit` in the backend, then notify listeners.
    pub fn close_unit(
        &self,
        unit: UnitId,
        clean_repository: bool,
        required_units: &HashSet<UnitId>,
    ) -> RepositoryResult<()> {
        self.backend()?.close_unit(unit, clean_repository, required_units)?;
        self.listeners.fire_unit_closed_event(unit);
        Ok(())
    }

    pub fn remove_unit(&self, unit: UnitId) -> RepositoryResult<()> {
        Ok(self.backend()?.remove_unit(unit)?)
    }

    pub fn file_id_by_name(&self, unit: UnitId, file_name: &str) -> RepositoryResult<FileId> {
        Ok(self.backend()?.file_id_by_name(unit, file_name)?)
    }

    pub fn file_name_by_id(&self, unit: UnitId, file: FileId) -> RepositoryResult<CompactString> {
        Ok(self.backend()?.file_name_by_id(unit, file)?)
    }

    /// Never fails; unresolvable ids yield a placeholder name.
    pub fn file_name_by_id_safe(&self, unit: UnitId, file: FileId) -> CompactString {
        match self.backend() {
            Ok(backend) => backend.file_name_by_id_safe(unit, file),
            Err(_) => placeholder_file_name(unit, file),
        }
    }

    pub fn unit_name(&self, unit: UnitId) -> RepositoryResult<CompactString> {
        Ok(self.backend()?.unit_name(unit)?)
    }

    pub fn unit_id_for_storage(&self, storage_name: &str) -> RepositoryResult<UnitId> {
        Ok(self.backend()?.unit_id_for_storage(storage_name)?)
    }

    pub fn unit_id(&self, descriptor: &UnitDescriptor) -> RepositoryResult<UnitId> {
        Ok(self.backend()?.unit_id(descriptor)?)
    }

    /// Id of an already known unit; unknown descriptors stay unknown.
    pub fn lookup_unit(&self, descriptor: &UnitDescriptor) -> RepositoryResult<Option<UnitId>> {
        Ok(self.backend()?.lookup_unit(descriptor)?)
    }

    pub fn layering_support(&self, source_unit: UnitId) -> RepositoryResult<Option<LayeringSupport>> {
        Ok(self.backend()?.layering_support(source_unit))
    }
}

/// Installs [`BackendState::ShutDown`] when dropped, including on unwind.
struct ShutDownOnDrop<'a>(&'a ArcSwap<BackendState>);

impl Drop for ShutDownOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(Arc::new(BackendState::ShutDown));
    }
}
