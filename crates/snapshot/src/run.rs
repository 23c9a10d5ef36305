//! One snapshot run
//!
//! Load the index, ask the journal what changed, walk the source into a new
//! snapshot directory, then commit the index. Nothing is committed unless
//! the walk finishes.

use crate::error::SnapshotError;
use crate::index::SnapshotIndex;
use crate::stats::WalkStats;
use crate::walker::{WalkOptions, Walker, DEFAULT_COPY_CHUNK_BYTES};
use crate::Result;
use journal::{ChangedPaths, Changes, JournalTracker, TrackerOutcome, VolumeProvider};
use lb_core::store::{TargetLayout, RESERVED_NAMES};
use lb_core::Notifier;
use platform::Linker;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::AtomicBool;
use tracing::{debug, info};

/// Inputs of a snapshot run
#[derive(Debug, Clone)]
pub struct SnapshotOptions {
    pub source: PathBuf,
    pub target: PathBuf,
    pub name: String,

    /// Consult the change journal to link unchanged entries
    pub use_journal: bool,

    /// Link unchanged directories instead of only files
    pub reuse_directories: bool,

    pub copy_chunk_bytes: usize,
}

impl SnapshotOptions {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            name: name.into(),
            use_journal: true,
            reuse_directories: false,
            copy_chunk_bytes: DEFAULT_COPY_CHUNK_BYTES,
        }
    }
}

/// How the journal shaped this run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    /// Turned off by the caller
    Disabled,
    /// No journal could be opened or created
    Unavailable,
    /// Cursor was not continuous; everything copied
    ReplayAll,
    /// Entries outside the changed set were linked
    Incremental { changed_paths: usize },
}

impl fmt::Display for JournalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalMode::Disabled => write!(f, "disabled"),
            JournalMode::Unavailable => write!(f, "unavailable"),
            JournalMode::ReplayAll => write!(f, "full replay"),
            JournalMode::Incremental { changed_paths } => {
                write!(f, "incremental ({} changed paths)", changed_paths)
            }
        }
    }
}

/// Outcome of a committed snapshot
#[derive(Debug, Clone)]
pub struct SnapshotReport {
    pub name: String,
    pub snapshot_dir: PathBuf,
    /// Snapshot entries were linked against, if any
    pub baseline: Option<String>,
    pub journal: JournalMode,
    pub records_seen: u64,
    pub stats: WalkStats,
}

/// Check that `name` can name a snapshot directory
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason| SnapshotError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.trim().is_empty() {
        return Err(invalid("empty"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(invalid("must be a single path component"));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => return Err(invalid("must be a single path component")),
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(invalid("reserved for the snapshot index"));
    }
    Ok(())
}

/// Take one snapshot of `options.source` into `options.target`
///
/// `provider` is the change-journal adapter for the source volume, if the
/// platform has one. Fatal conditions leave `previous` and `journal`
/// untouched; a partially written snapshot directory is left for inspection.
pub fn run_snapshot(
    options: &SnapshotOptions,
    provider: Option<&dyn VolumeProvider>,
    linker: &dyn Linker,
    notifier: &dyn Notifier,
    cancel: &AtomicBool,
) -> Result<SnapshotReport> {
    validate_name(&options.name)?;

    let source = fs::canonicalize(&options.source)
        .ok()
        .filter(|path| path.is_dir())
        .ok_or_else(|| SnapshotError::SourceMissing(options.source.clone()))?;

    fs::create_dir_all(&options.target).map_err(|e| SnapshotError::write(&options.target, e))?;
    let target = fs::canonicalize(&options.target).map_err(|e| SnapshotError::write(&options.target, e))?;
    let layout = TargetLayout::new(target);

    let snapshot_dir = layout.snapshot_dir(&options.name);
    if fs::symlink_metadata(&snapshot_dir).is_ok() {
        return Err(SnapshotError::TargetExists(snapshot_dir));
    }

    let mut index = SnapshotIndex::load(&layout)?;
    let baseline = usable_baseline(&index, &layout, notifier);

    info!(
        "Snapshot {} of {} into {}",
        options.name,
        source.display(),
        layout.root().display()
    );

    let mut outcome = track_changes(&index, options, provider, notifier)?;
    if let Changes::Incremental(paths) = &mut outcome.changes {
        mark_exclusion_changes(&index, paths);
    }
    let journal_mode = match &outcome.changes {
        Changes::Unavailable if !options.use_journal => JournalMode::Disabled,
        Changes::Unavailable => JournalMode::Unavailable,
        Changes::ReplayAll { .. } => JournalMode::ReplayAll,
        Changes::Incremental(paths) => JournalMode::Incremental {
            changed_paths: paths.len(),
        },
    };

    let walk_options = WalkOptions {
        reuse_directories: options.reuse_directories,
        copy_chunk_bytes: options.copy_chunk_bytes,
    };
    let mut walker = Walker::new(&source, &snapshot_dir, linker, notifier)
        .with_exclusions(&index.exclusions)
        .with_options(walk_options)
        .with_cancel(cancel);

    let previous_dir = baseline.as_ref().map(|name| layout.snapshot_dir(name));
    let reuse_from = match (&previous_dir, outcome.changes.incremental()) {
        (Some(dir), Some(changed)) => Some((dir.as_path(), changed)),
        _ => None,
    };
    if let Some((dir, changed)) = reuse_from {
        debug!("Reusing unchanged entries from {}", dir.display());
        walker = walker.with_baseline(dir, changed);
    }

    let stats = walker.run().map_err(|e| {
        notifier.error(&format!(
            "Snapshot {} aborted, partial directory left at {}",
            options.name,
            snapshot_dir.display()
        ));
        e
    })?;

    index.commit(&layout, &options.name, outcome.state)?;

    info!(
        "Committed snapshot {}: {} files copied ({} bytes), {} linked",
        options.name,
        stats.files_copied,
        stats.bytes_copied,
        stats.linked()
    );

    Ok(SnapshotReport {
        name: options.name.clone(),
        snapshot_dir,
        baseline: reuse_from.and(baseline),
        journal: journal_mode,
        records_seen: outcome.records_seen,
        stats,
    })
}

/// The previous snapshot, if its directory still exists
fn usable_baseline(
    index: &SnapshotIndex,
    layout: &TargetLayout,
    notifier: &dyn Notifier,
) -> Option<String> {
    let previous = index.previous.as_ref()?;
    if layout.snapshot_dir(previous).is_dir() {
        Some(previous.clone())
    } else {
        notifier.warning(&format!(
            "Previous snapshot {} is missing from {}, copying everything",
            previous,
            layout.root().display()
        ));
        None
    }
}

/// Treat paths whose exclusion was added or removed since the previous
/// snapshot as changed subtrees, so they are neither linked nor skipped stale
fn mark_exclusion_changes(index: &SnapshotIndex, paths: &mut ChangedPaths) {
    let changes = index.exclusion_changes();
    if changes.is_empty() {
        return;
    }
    for path in changes {
        debug!("Exclusion of {} changed since previous snapshot", path);
        paths.insert_subtree(path);
    }
    paths.flesh_out();
}

fn track_changes(
    index: &SnapshotIndex,
    options: &SnapshotOptions,
    provider: Option<&dyn VolumeProvider>,
    notifier: &dyn Notifier,
) -> Result<TrackerOutcome> {
    let state = index.journal.clone();

    let provider = match provider {
        Some(provider) if options.use_journal => provider,
        _ => {
            if options.use_journal {
                notifier.notice("No change journal for this volume, copying everything");
            } else {
                notifier.notice("Change journal disabled, copying everything");
            }
            return Ok(TrackerOutcome {
                changes: Changes::Unavailable,
                state,
                records_seen: 0,
            });
        }
    };

    Ok(JournalTracker::new(provider, notifier).process(state)?)
}
