//! Target directory layout and crash-safe state files

use crate::codec::{self, BlobKind};
use crate::error::CoreError;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// File name of the latest-snapshot pointer
pub const PREVIOUS_FILE: &str = "previous";
/// File name of the journal cursor and FRN map
pub const JOURNAL_FILE: &str = "journal";
/// File name of the exclusion list
pub const EXCLUSIONS_FILE: &str = "exclusions";
/// File name of the per-target config
pub const CONFIG_FILE: &str = "linkback.toml";
/// File name of the run lock
pub const LOCK_FILE: &str = ".lock";

/// Names a snapshot may never take
pub const RESERVED_NAMES: &[&str] = &[PREVIOUS_FILE, JOURNAL_FILE, EXCLUSIONS_FILE, CONFIG_FILE, LOCK_FILE];

/// Layout of a target directory
///
/// ```text
/// <target>/
///   <snapshot_name_1>/
///   <snapshot_name_2>/
///   previous
///   journal
///   exclusions
///   linkback.toml   (optional)
///   .lock           (held while a run is active)
/// ```
#[derive(Debug, Clone)]
pub struct TargetLayout {
    root: PathBuf,
}

impl TargetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshot_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn previous_file(&self) -> PathBuf {
        self.root.join(PREVIOUS_FILE)
    }

    pub fn journal_file(&self) -> PathBuf {
        self.root.join(JOURNAL_FILE)
    }

    pub fn exclusions_file(&self) -> PathBuf {
        self.root.join(EXCLUSIONS_FILE)
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// Directories under the target that look like snapshots, sorted by name
    pub fn snapshot_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let entries = fs::read_dir(&self.root).map_err(|e| CoreError::io(&self.root, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| CoreError::io(&self.root, e))?;
            let file_type = entry.file_type().map_err(|e| CoreError::io(entry.path(), e))?;
            if !file_type.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !RESERVED_NAMES.contains(&name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Read and decode a state blob; a missing file yields `None`
pub fn read_state<T: DeserializeOwned>(path: &Path, kind: BlobKind) -> Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CoreError::io(path, e)),
    };

    codec::decode(kind, &bytes)
        .map(Some)
        .map_err(|source| CoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Encode a state blob and write it atomically
pub fn write_state<T: Serialize>(path: &Path, kind: BlobKind, value: &T) -> Result<()> {
    let bytes = codec::encode(kind, value).map_err(|source| CoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    atomic_write(path, &bytes)
}

/// Atomic write helper
///
/// Writes data to a temporary file in the target's directory, fsyncs it,
/// then renames it over the target path.
pub fn atomic_write(target: &Path, data: &[u8]) -> Result<()> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| CoreError::io(dir, e))?;
    tmp.write_all(data).map_err(|e| CoreError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| CoreError::io(tmp.path(), e))?;
    tmp.persist(target)
        .map_err(|e| CoreError::io(target, e.error))?;

    sync_dir(dir);
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = fs::File::open(dir).and_then(|f| f.sync_all()) {
        tracing::debug!("Failed to fsync {}: {}", dir.display(), e);
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

/// Normalize a path for set membership
///
/// - Backslashes become `/`
/// - Trailing separators are removed (the bare root `/` is kept)
/// - A Windows verbatim prefix (`\\?\`) is dropped
pub fn normalize_path(path: &Path) -> String {
    normalize_str(&path.to_string_lossy())
}

/// String form of [`normalize_path`]
pub fn normalize_str(path: &str) -> String {
    let mut s = path.replace('\\', "/");
    if let Some(rest) = s.strip_prefix("//?/") {
        s = rest.to_string();
    }
    while s.len() > 1 && s.ends_with('/') {
        s.pop();
    }
    s
}
