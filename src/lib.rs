pub mod cli;
pub mod config;
pub mod logging;
pub mod repository;
pub mod storage;
pub mod types;

pub use config::{BackendKind, Settings};
pub use repository::{
    BackendState, Repository, RepositoryBuilder, RepositoryError, RepositoryListener,
    RepositoryListenersManager, RepositoryResult,
};
pub use storage::{BackendFactory, LayeringSupport, RepositoryBackend, StorageError};
pub use types::*;
