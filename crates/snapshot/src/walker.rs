//! Snapshot walker
//!
//! Depth-first traversal of the source tree. For every entry the walker
//! decides, in order:
//! 1. Excluded: nothing is created
//! 2. Reusable: linked into the previous snapshot (hard link for files,
//!    directory link for directories)
//! 3. Regular file: copied in chunks
//! 4. Directory: created, then each child visited
//!
//! Reading problems (unlistable directory, unreadable file) are warnings and
//! the walk goes on. Any failure to write into the new snapshot is fatal.

use crate::error::SnapshotError;
use crate::exclusions::ExclusionSet;
use crate::stats::WalkStats;
use crate::Result;
use journal::ChangedPaths;
use lb_core::{normalize_path, Notifier};
use platform::Linker;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Default size of a copy chunk
pub const DEFAULT_COPY_CHUNK_BYTES: usize = 1024 * 1024;

/// Options for a walk
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Link unchanged directories instead of descending into them
    pub reuse_directories: bool,

    /// Buffer size for file copies
    pub copy_chunk_bytes: usize,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            reuse_directories: false,
            copy_chunk_bytes: DEFAULT_COPY_CHUNK_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Dir,
    /// Symlinks, devices, sockets
    Other,
}

impl EntryKind {
    fn of(file_type: fs::FileType) -> Self {
        if file_type.is_file() {
            EntryKind::File
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::Other
        }
    }
}

/// Previous snapshot plus the paths changed since it was taken
struct Baseline<'a> {
    dir: &'a Path,
    changed: &'a ChangedPaths,
}

/// Materializes one snapshot of `source_root` into `snapshot_dir`
pub struct Walker<'a> {
    source_root: &'a Path,
    snapshot_dir: &'a Path,
    baseline: Option<Baseline<'a>>,
    exclusions: Option<&'a ExclusionSet>,
    options: WalkOptions,
    linker: &'a dyn Linker,
    notifier: &'a dyn Notifier,
    cancel: Option<&'a AtomicBool>,
    stats: WalkStats,
    buffer: Vec<u8>,
}

impl<'a> Walker<'a> {
    pub fn new(
        source_root: &'a Path,
        snapshot_dir: &'a Path,
        linker: &'a dyn Linker,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            source_root,
            snapshot_dir,
            baseline: None,
            exclusions: None,
            options: WalkOptions::default(),
            linker,
            notifier,
            cancel: None,
            stats: WalkStats::default(),
            buffer: Vec::new(),
        }
    }

    /// Allow reuse of entries from `previous_dir` that are not in `changed`
    pub fn with_baseline(mut self, previous_dir: &'a Path, changed: &'a ChangedPaths) -> Self {
        self.baseline = Some(Baseline {
            dir: previous_dir,
            changed,
        });
        self
    }

    pub fn with_exclusions(mut self, exclusions: &'a ExclusionSet) -> Self {
        self.exclusions = Some(exclusions);
        self
    }

    pub fn with_options(mut self, options: WalkOptions) -> Self {
        self.options = options;
        self
    }

    /// Stop between children once `cancel` is set
    pub fn with_cancel(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Walk the whole source tree
    pub fn run(mut self) -> Result<WalkStats> {
        self.backup_item(Path::new(""))?;
        Ok(self.stats)
    }

    /// Materialize the entry at `rel` (relative to the source root; empty
    /// for the root itself) and everything below it
    pub fn backup_item(&mut self, rel: &Path) -> Result<()> {
        if rel.as_os_str().is_empty() {
            return self.backup_root();
        }

        let source = self.source_root.join(rel);
        let dest = self.snapshot_dir.join(rel);
        let key = normalize_path(&source);

        if self.is_excluded(&key) {
            debug!("Excluded {}", key);
            self.stats.excluded += 1;
            self.report_progress();
            return Ok(());
        }

        let kind = match fs::symlink_metadata(&source) {
            Ok(meta) => EntryKind::of(meta.file_type()),
            Err(e) => {
                self.warn(format!("Cannot read {}, skipping: {}", source.display(), e));
                self.stats.skipped += 1;
                return Ok(());
            }
        };

        if kind == EntryKind::Other {
            self.warn(format!(
                "Skipping {}: not a regular file or directory",
                source.display()
            ));
            self.stats.skipped += 1;
            self.report_progress();
            return Ok(());
        }

        if let Some(previous) = self.reusable_counterpart(rel, &key, kind) {
            self.link(&dest, &previous, kind)?;
            self.report_progress();
            return Ok(());
        }

        match kind {
            EntryKind::File => self.copy_file(&source, &dest)?,
            _ => {
                self.create_dir(&dest)?;
                self.report_progress();
                self.backup_children(rel, &source)?;
            }
        }
        Ok(())
    }

    /// The root is always a real directory, even when excluded
    fn backup_root(&mut self) -> Result<()> {
        let source = self.source_root;
        let dest = self.snapshot_dir;
        self.create_dir(dest)?;
        self.report_progress();

        let key = normalize_path(source);
        if self.is_excluded(&key) {
            debug!("Source root {} is excluded, snapshot is empty", key);
            self.stats.excluded += 1;
            return Ok(());
        }

        self.backup_children(Path::new(""), source)
    }

    fn backup_children(&mut self, rel: &Path, source: &Path) -> Result<()> {
        for name in self.list_children(source) {
            self.check_cancelled()?;
            self.backup_item(&rel.join(name))?;
        }
        Ok(())
    }

    /// Child names in sorted order; an unlistable directory is empty
    fn list_children(&mut self, dir: &Path) -> Vec<OsString> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                self.warn(format!(
                    "Cannot list {}, treating it as empty: {}",
                    dir.display(),
                    e
                ));
                return Vec::new();
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            match entry {
                Ok(entry) => names.push(entry.file_name()),
                Err(e) => self.warn(format!("Cannot list an entry of {}: {}", dir.display(), e)),
            }
        }
        names.sort();
        names
    }

    fn is_excluded(&self, key: &str) -> bool {
        self.exclusions.is_some_and(|set| set.contains(key))
    }

    /// Path of the entry in the previous snapshot when it may be linked
    ///
    /// Requires a baseline, an entry neither in the changed set nor below a
    /// changed subtree (and directory reuse for directories), and a
    /// counterpart of the same kind.
    fn reusable_counterpart(&self, rel: &Path, key: &str, kind: EntryKind) -> Option<PathBuf> {
        let baseline = self.baseline.as_ref()?;
        if kind == EntryKind::Dir && !self.options.reuse_directories {
            return None;
        }
        if baseline.changed.contains(key) {
            return None;
        }

        let previous = baseline.dir.join(rel);
        // Directory links from earlier snapshots count as directories
        let counterpart = fs::metadata(&previous).ok().map(|m| EntryKind::of(m.file_type()));
        if counterpart == Some(kind) {
            Some(previous)
        } else {
            debug!(
                "No {:?} counterpart at {}, not reusing",
                kind,
                previous.display()
            );
            None
        }
    }

    fn link(&mut self, dest: &Path, previous: &Path, kind: EntryKind) -> Result<()> {
        match kind {
            EntryKind::File => {
                self.linker
                    .hard_link(dest, previous)
                    .map_err(|e| SnapshotError::write(dest, e))?;
                self.stats.files_linked += 1;
            }
            _ => {
                self.linker
                    .directory_link(dest, previous)
                    .map_err(|e| SnapshotError::write(dest, e))?;
                self.stats.dirs_linked += 1;
            }
        }
        debug!("Linked {} -> {}", dest.display(), previous.display());
        Ok(())
    }

    fn create_dir(&mut self, dest: &Path) -> Result<()> {
        fs::create_dir(dest).map_err(|e| SnapshotError::write(dest, e))?;
        self.stats.dirs_created += 1;
        Ok(())
    }

    /// Copy contents only; a read failure drops the partial copy
    fn copy_file(&mut self, source: &Path, dest: &Path) -> Result<()> {
        let mut input = match File::open(source) {
            Ok(file) => file,
            Err(e) => {
                self.warn(format!("Cannot open {}, skipping: {}", source.display(), e));
                self.stats.skipped += 1;
                return Ok(());
            }
        };

        let mut output = File::create(dest).map_err(|e| SnapshotError::write(dest, e))?;

        let chunk = self.options.copy_chunk_bytes.max(1);
        if self.buffer.len() != chunk {
            self.buffer = vec![0u8; chunk];
        }

        let mut copied = 0u64;
        loop {
            let n = match input.read(&mut self.buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    drop(output);
                    let _ = fs::remove_file(dest);
                    self.warn(format!("Cannot read {}, skipping: {}", source.display(), e));
                    self.stats.skipped += 1;
                    return Ok(());
                }
            };
            output
                .write_all(&self.buffer[..n])
                .map_err(|e| SnapshotError::write(dest, e))?;
            copied += n as u64;
        }
        output.flush().map_err(|e| SnapshotError::write(dest, e))?;

        self.stats.files_copied += 1;
        self.stats.bytes_copied += copied;
        self.report_progress();
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        match self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(SnapshotError::Cancelled),
            _ => Ok(()),
        }
    }

    fn warn(&mut self, message: String) {
        self.stats.warnings += 1;
        self.notifier.warning(&message);
    }

    fn report_progress(&self) {
        self.notifier.progress(self.stats.entries());
    }
}
