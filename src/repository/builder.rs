//! Builder wiring a [`Repository`] to its backend factory and listeners.

use std::sync::Arc;

use super::listeners::{RepositoryListener, RepositoryListenersManager, TracingListener};
use super::Repository;
use crate::config::{BackendKind, Settings};
use crate::storage::{BackendFactory, DiskBackendFactory, MemoryBackendFactory};

/// Builder for constructing a Repository.
pub struct RepositoryBuilder {
    factory: Option<Arc<dyn BackendFactory>>,
    listeners: Vec<Arc<dyn RepositoryListener>>,
}

impl RepositoryBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            factory: None,
            listeners: Vec::new(),
        }
    }

    /// Builder preconfigured from settings: backend kind, storage directory
    /// and optional unit tracing.
    pub fn from_settings(settings: &Settings) -> Self {
        let builder = match settings.repository.backend {
            BackendKind::Memory => Self::new().factory(MemoryBackendFactory),
            BackendKind::Disk => Self::new().factory(DiskBackendFactory::new(settings.storage_root())),
        };

        if settings.repository.trace_units {
            builder.listener(Arc::new(TracingListener))
        } else {
            builder
        }
    }

    /// Set the backend factory.
    pub fn factory(mut self, factory: impl BackendFactory + 'static) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Add an initial listener.
    pub fn listener(mut self, listener: Arc<dyn RepositoryListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Build the Repository. Without a factory the repository keeps its
    /// data in memory.
    pub fn build(self) -> Repository {
        let factory = self.factory.unwrap_or_else(|| Arc::new(MemoryBackendFactory));
        let listeners = Arc::new(RepositoryListenersManager::new(self.listeners));
        Repository::new(factory, listeners)
    }
}

impl Default for RepositoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
