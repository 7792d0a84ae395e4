//! Error type shared by the loader, engine and watcher.

use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("directory does not exist or is not readable: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),
}

impl SyncError {
    /// Wrap an `io::Error` with the path it happened on
    pub fn io(path: &Path, source: io::Error) -> Self {
        SyncError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
