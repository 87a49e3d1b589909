//! Error types for the repository façade.

use thiserror::Error;

use crate::storage::StorageError;

/// Errors from repository operations.
///
/// Only the lifecycle checks raise registry-specific variants; anything the
/// backend reports comes through [`RepositoryError::Storage`] unchanged.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Invalid persistence version {0}: must not be negative")]
    InvalidVersion(i32),

    #[error("Repository already started with version {active}, cannot start with {requested}")]
    VersionMismatch { active: u32, requested: u32 },

    #[error("Repository is not started")]
    NotStarted,

    #[error("Repository has been shut down")]
    ShutDown,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
