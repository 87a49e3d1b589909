use std::path::PathBuf;
use thiserror::Error;

use crate::types::{FileId, UnitId};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Unknown unit: {0}")]
    UnknownUnit(UnitId),

    #[error("Unknown file {file} in {unit}")]
    UnknownFile { unit: UnitId, file: FileId },

    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupted store at {path}: {reason}")]
    Corrupted { path: PathBuf, reason: String },
}

pub type StorageResult<T> = Result<T, StorageError>;
