use journal::JournalError;
use lb_core::CoreError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Source directory does not exist: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("Snapshot directory already exists: {}", .0.display())]
    TargetExists(PathBuf),

    #[error("Invalid snapshot name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Snapshot cancelled")]
    Cancelled,

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Change journal failed: {0}")]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Index(#[from] CoreError),
}

impl SnapshotError {
    pub(crate) fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SnapshotError::Write {
            path: path.into(),
            source,
        }
    }
}
