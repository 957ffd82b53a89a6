use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KvError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to bootstrap store at {path:?}: {source}")]
    Bootstrap {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Attempt to commit a batch when not in a batch")]
    NotInBatch,

    #[error("Cannot begin a batch: store is closed or a batch is already open")]
    BatchUnavailable,

    #[error("Cannot create store at {0:?}: already open, path exists, or path is not a regular file")]
    CreateFailed(PathBuf),

    #[error("Cannot open store at {0:?}: missing file, foreign format, or no default table")]
    OpenFailed(PathBuf),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, KvError>;
