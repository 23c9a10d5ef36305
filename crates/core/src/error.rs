use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from decoding a persisted state blob
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("blob too short ({0} bytes)")]
    Truncated(usize),

    #[error("bad magic header")]
    BadMagic,

    #[error("unsupported format version {found} (expected {expected})")]
    UnsupportedVersion { found: u8, expected: u8 },

    #[error("wrong blob kind {found} (expected {expected})")]
    WrongKind { found: u8, expected: u8 },

    #[error("payload error: {0}")]
    Payload(#[from] bincode::Error),
}

/// Errors from reading or writing files in the target directory
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt state file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
}

impl CoreError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CoreError::Io {
            path: path.into(),
            source,
        }
    }
}
