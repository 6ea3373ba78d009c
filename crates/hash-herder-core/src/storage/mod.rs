pub mod models;
pub mod queries;
pub mod sqlite;

pub use sqlite::Database;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    /// The uniqueness constraint on the hash column rejected the write.
    #[error("record for hash {0} already exists")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StorageError>;
