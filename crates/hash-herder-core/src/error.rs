use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::placement::PlacementError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{op} failed for {path}: {source}")]
    PathIo {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Placement error: {0}")]
    Placement(#[from] PlacementError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap an IO error with the operation and path that produced it.
    pub fn path_io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::PathIo {
            op,
            path: path.into(),
            source,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(StorageError::from(err))
    }
}
