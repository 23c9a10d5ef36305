//! End-to-end snapshot runs against real directories, with the change
//! journal simulated in memory and kept in step with the filesystem.

#![cfg(unix)]

use journal::memory::ROOT_FRN;
use journal::{Frn, JournalState, MemoryJournal};
use lb_core::store::TargetLayout;
use lb_core::{normalize_path, Level, RecordingNotifier};
use platform::NativeLinker;
use snapshot::{
    run_snapshot, ExclusionSet, JournalMode, SnapshotError, SnapshotIndex, SnapshotOptions,
    SnapshotReport,
};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use tempfile::TempDir;
use walkdir::WalkDir;

/// Source tree, target directory and a simulated journal over the source
struct Fixture {
    _temp: TempDir,
    source: PathBuf,
    target: PathBuf,
    volume: MemoryJournal,
    paths: HashMap<Frn, PathBuf>,
    notifier: RecordingNotifier,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        fs::create_dir(&source).unwrap();
        let source = fs::canonicalize(&source).unwrap();
        let target = fs::canonicalize(temp.path()).unwrap().join("target");

        let volume = MemoryJournal::new(normalize_path(&source));
        let mut paths = HashMap::new();
        paths.insert(ROOT_FRN, source.clone());

        Self {
            _temp: temp,
            source,
            target,
            volume,
            paths,
            notifier: RecordingNotifier::new(),
        }
    }

    /// Source = {a.txt="AAA", b/c.txt="CCC"}
    fn seeded() -> (Self, Frn, Frn, Frn) {
        let mut f = Self::new();
        let a = f.write(ROOT_FRN, "a.txt", "AAA");
        let b = f.mkdir(ROOT_FRN, "b");
        let c = f.write(b, "c.txt", "CCC");
        (f, a, b, c)
    }

    fn mkdir(&mut self, parent: Frn, name: &str) -> Frn {
        let path = self.paths[&parent].join(name);
        fs::create_dir(&path).unwrap();
        let frn = self.volume.create_dir(parent, name);
        self.paths.insert(frn, path);
        frn
    }

    fn write(&mut self, parent: Frn, name: &str, contents: &str) -> Frn {
        let path = self.paths[&parent].join(name);
        fs::write(&path, contents).unwrap();
        let frn = self.volume.create_file(parent, name);
        self.paths.insert(frn, path);
        frn
    }

    fn overwrite(&self, frn: Frn, contents: &str) {
        fs::write(&self.paths[&frn], contents).unwrap();
        self.volume.modify(frn);
    }

    fn rename(&mut self, frn: Frn, new_parent: Frn, new_name: &str) {
        let to = self.paths[&new_parent].join(new_name);
        fs::rename(&self.paths[&frn], &to).unwrap();
        self.volume.rename(frn, new_parent, new_name);
        self.paths.insert(frn, to);
    }

    fn options(&self, name: &str, reuse_directories: bool) -> SnapshotOptions {
        let mut options = SnapshotOptions::new(&self.source, &self.target, name);
        options.reuse_directories = reuse_directories;
        options
    }

    fn run_with(&self, options: &SnapshotOptions) -> Result<SnapshotReport, SnapshotError> {
        let cancel = AtomicBool::new(false);
        run_snapshot(options, Some(&self.volume), &NativeLinker, &self.notifier, &cancel)
    }

    fn run(&self, name: &str, reuse_directories: bool) -> SnapshotReport {
        self.run_with(&self.options(name, reuse_directories)).unwrap()
    }

    fn snap(&self, name: &str) -> PathBuf {
        self.target.join(name)
    }

    fn layout(&self) -> TargetLayout {
        TargetLayout::new(&self.target)
    }

    fn previous(&self) -> Option<String> {
        SnapshotIndex::load(&self.layout()).unwrap().previous
    }

    fn journal_state(&self) -> JournalState {
        JournalState::load(&self.layout().journal_file()).unwrap()
    }
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).unwrap().file_type().is_symlink()
}

fn inode(path: &Path) -> u64 {
    fs::metadata(path).unwrap().ino()
}

/// Every file reachable from a snapshot root, following links
fn contents(root: &Path) -> BTreeMap<String, String> {
    WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .map(|entry| entry.unwrap())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let rel = entry.path().strip_prefix(root).unwrap();
            (
                rel.to_string_lossy().into_owned(),
                fs::read_to_string(entry.path()).unwrap(),
            )
        })
        .collect()
}

fn expected(files: &[(&str, &str)]) -> BTreeMap<String, String> {
    files
        .iter()
        .map(|(path, body)| (path.to_string(), body.to_string()))
        .collect()
}

#[test]
fn test_cold_start_copies_everything() {
    let (f, _, _, _) = Fixture::seeded();

    let report = f.run("S1", false);

    let s1 = f.snap("S1");
    assert_eq!(fs::read_to_string(s1.join("a.txt")).unwrap(), "AAA");
    assert_eq!(fs::read_to_string(s1.join("b/c.txt")).unwrap(), "CCC");
    assert!(!is_symlink(&s1.join("b")));
    assert_eq!(fs::metadata(s1.join("a.txt")).unwrap().nlink(), 1);

    assert_eq!(report.journal, JournalMode::ReplayAll);
    assert_eq!(report.baseline, None);
    assert_eq!(report.stats.files_copied, 2);
    assert_eq!(report.stats.bytes_copied, 6);
    assert_eq!(report.stats.linked(), 0);

    assert_eq!(f.previous().as_deref(), Some("S1"));
    let state = f.journal_state();
    assert_eq!(state.journal_id, f.volume.journal_id());
    assert_eq!(state.last_usn, Some(f.volume.next_usn()));
    assert_eq!(state.frn_map.len(), 1);
}

#[test]
fn test_unchanged_rerun_links_everything() {
    let (f, _, _, _) = Fixture::seeded();
    f.run("S1", true);

    let report = f.run("S2", true);

    let s1 = f.snap("S1");
    let s2 = f.snap("S2");
    assert!(!is_symlink(&s2));
    assert_eq!(inode(&s2.join("a.txt")), inode(&s1.join("a.txt")));
    assert_eq!(fs::read_to_string(s2.join("a.txt")).unwrap(), "AAA");
    assert!(is_symlink(&s2.join("b")));
    assert_eq!(fs::read_link(s2.join("b")).unwrap(), s1.join("b"));
    assert_eq!(fs::read_to_string(s2.join("b/c.txt")).unwrap(), "CCC");

    assert_eq!(report.journal, JournalMode::Incremental { changed_paths: 0 });
    assert_eq!(report.baseline.as_deref(), Some("S1"));
    assert_eq!(report.stats.bytes_copied, 0);
    assert_eq!(report.stats.files_copied, 0);
    assert_eq!(report.stats.files_linked, 1);
    assert_eq!(report.stats.dirs_linked, 1);
    assert_eq!(f.previous().as_deref(), Some("S2"));
}

#[test]
fn test_single_file_change_copies_only_that_file() {
    let (f, _, _, c) = Fixture::seeded();
    f.run("S1", true);
    f.run("S2", true);

    f.overwrite(c, "CHANGED");
    let report = f.run("S3", true);

    let s3 = f.snap("S3");
    assert_eq!(inode(&s3.join("a.txt")), inode(&f.snap("S1").join("a.txt")));
    assert!(!is_symlink(&s3.join("b")));
    assert!(s3.join("b").is_dir());
    assert_eq!(fs::read_to_string(s3.join("b/c.txt")).unwrap(), "CHANGED");
    assert_eq!(fs::metadata(s3.join("b/c.txt")).unwrap().nlink(), 1);

    // Earlier snapshots are untouched
    assert_eq!(fs::read_to_string(f.snap("S1").join("b/c.txt")).unwrap(), "CCC");
    assert_eq!(fs::read_to_string(f.snap("S2").join("b/c.txt")).unwrap(), "CCC");

    assert!(matches!(report.journal, JournalMode::Incremental { changed_paths } if changed_paths > 0));
    assert_eq!(report.stats.files_copied, 1);
    assert_eq!(report.stats.bytes_copied, 7);
    assert_eq!(report.stats.files_linked, 1);
    assert_eq!(report.stats.dirs_linked, 0);
}

#[test]
fn test_journal_id_flip_copies_everything() {
    let (f, _, _, _) = Fixture::seeded();
    f.run("S1", true);
    let old_id = f.journal_state().journal_id;

    let new_id = f.volume.recreate_journal();
    let report = f.run("S2", true);

    assert_eq!(report.journal, JournalMode::ReplayAll);
    assert_eq!(report.stats.linked(), 0);
    assert_eq!(report.stats.files_copied, 2);

    let s2 = f.snap("S2");
    assert!(!is_symlink(&s2.join("b")));
    assert_ne!(inode(&s2.join("a.txt")), inode(&f.snap("S1").join("a.txt")));

    assert_ne!(old_id, Some(new_id));
    assert_eq!(f.journal_state().journal_id, Some(new_id));
    assert!(f
        .notifier
        .messages(Level::Notice)
        .iter()
        .any(|m| m.contains("not continuous")));
}

#[test]
fn test_purged_journal_copies_everything() {
    let (f, a, _, _) = Fixture::seeded();
    f.run("S1", true);

    f.overwrite(a, "AAA2");
    f.volume.purge_before(f.volume.next_usn());
    let report = f.run("S2", true);

    assert_eq!(report.journal, JournalMode::ReplayAll);
    assert_eq!(fs::read_to_string(f.snap("S2").join("a.txt")).unwrap(), "AAA2");
}

#[test]
fn test_excluded_subtree_is_omitted() {
    let (f, _, _, _) = Fixture::seeded();
    f.run("S1", true);

    let mut exclusions = ExclusionSet::new();
    exclusions.insert(&normalize_path(&f.source.join("b")));
    exclusions.save(&f.layout().exclusions_file()).unwrap();

    let report = f.run("S2", true);

    let s2 = f.snap("S2");
    assert!(fs::symlink_metadata(s2.join("b")).is_err());
    assert_eq!(fs::read_to_string(s2.join("a.txt")).unwrap(), "AAA");
    assert_eq!(report.stats.excluded, 1);
}

#[test]
fn test_unreadable_directory_is_created_empty() {
    let (f, _, b, _) = Fixture::seeded();
    let dir = f.paths[&b].clone();
    fs::set_permissions(&dir, fs::Permissions::from_mode(0o000)).unwrap();

    // Permissions do not stop a privileged user
    if fs::read_dir(&dir).is_ok() {
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let result = f.run_with(&f.options("S1", false));
    fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();
    let report = result.unwrap();

    let s1 = f.snap("S1");
    assert!(s1.join("b").is_dir());
    assert_eq!(fs::read_dir(s1.join("b")).unwrap().count(), 0);
    assert_eq!(fs::read_to_string(s1.join("a.txt")).unwrap(), "AAA");
    assert_eq!(report.stats.warnings, 1);
    assert!(f
        .notifier
        .messages(Level::Warning)
        .iter()
        .any(|m| m.contains("Cannot list")));
    assert_eq!(f.previous().as_deref(), Some("S1"));
}

#[test]
fn test_chain_integrity_over_several_runs() {
    let (mut f, a, b, c) = Fixture::seeded();
    let mut history = Vec::new();

    f.run("S1", true);
    history.push(("S1", expected(&[("a.txt", "AAA"), ("b/c.txt", "CCC")])));

    f.run("S2", true);
    history.push(("S2", expected(&[("a.txt", "AAA"), ("b/c.txt", "CCC")])));

    f.overwrite(c, "CHANGED");
    let d = f.mkdir(b, "d");
    f.write(d, "e.txt", "EEE");
    f.run("S3", true);
    history.push((
        "S3",
        expected(&[("a.txt", "AAA"), ("b/c.txt", "CHANGED"), ("b/d/e.txt", "EEE")]),
    ));

    f.rename(a, b, "a-moved.txt");
    f.run("S4", true);
    history.push((
        "S4",
        expected(&[
            ("b/a-moved.txt", "AAA"),
            ("b/c.txt", "CHANGED"),
            ("b/d/e.txt", "EEE"),
        ]),
    ));

    f.run("S5", false);
    history.push((
        "S5",
        expected(&[
            ("b/a-moved.txt", "AAA"),
            ("b/c.txt", "CHANGED"),
            ("b/d/e.txt", "EEE"),
        ]),
    ));

    for (name, files) in &history {
        assert_eq!(&contents(&f.snap(name)), files, "snapshot {}", name);
    }

    // Unchanged content in the last snapshot is the bytes copied in S3
    assert_eq!(
        inode(&f.snap("S5").join("b/d/e.txt")),
        inode(&f.snap("S3").join("b/d/e.txt"))
    );
}

#[test]
fn test_unchanged_rerun_after_change_copies_nothing() {
    let (f, _, _, c) = Fixture::seeded();
    f.run("S1", true);
    f.overwrite(c, "CHANGED");
    f.run("S2", true);

    let report = f.run("S3", true);

    assert_eq!(report.journal, JournalMode::Incremental { changed_paths: 0 });
    assert_eq!(report.stats.bytes_copied, 0);
    assert_eq!(report.stats.files_copied, 0);
    assert_eq!(
        inode(&f.snap("S3").join("b/c.txt")),
        inode(&f.snap("S2").join("b/c.txt"))
    );
}

#[test]
fn test_undecodable_record_forces_copy() {
    let (f, _, _, c) = Fixture::seeded();
    f.run("S1", false);

    f.overwrite(c, "CHANGED");
    f.volume.corrupt_name(c);
    let report = f.run("S2", false);

    let s2 = f.snap("S2");
    assert_eq!(fs::read_to_string(s2.join("b/c.txt")).unwrap(), "CHANGED");
    assert_eq!(inode(&s2.join("a.txt")), inode(&f.snap("S1").join("a.txt")));
    assert_eq!(report.stats.files_copied, 1);
    assert_eq!(f.notifier.messages(Level::Warning).len(), 1);
}

#[test]
fn test_directory_swap_copies_new_contents() {
    let (mut f, _, _, _) = Fixture::seeded();
    let x = f.mkdir(ROOT_FRN, "x");
    f.write(x, "f.txt", "OLD");
    let y = f.mkdir(ROOT_FRN, "y");
    f.write(y, "f.txt", "NEW");
    f.run("S1", true);

    f.rename(x, ROOT_FRN, "x.bak");
    f.rename(y, ROOT_FRN, "x");
    f.run("S2", true);

    let s2 = f.snap("S2");
    assert_eq!(fs::read_to_string(s2.join("x/f.txt")).unwrap(), "NEW");
    assert_eq!(fs::read_to_string(s2.join("x.bak/f.txt")).unwrap(), "OLD");
    assert!(fs::symlink_metadata(s2.join("y")).is_err());
    assert!(!is_symlink(&s2.join("x")));
    assert!(is_symlink(&s2.join("b")));
    assert_eq!(
        contents(&s2),
        expected(&[
            ("a.txt", "AAA"),
            ("b/c.txt", "CCC"),
            ("x/f.txt", "NEW"),
            ("x.bak/f.txt", "OLD"),
        ])
    );
}

#[test]
fn test_removed_exclusion_restores_content() {
    let (mut f, _, b, _) = Fixture::seeded();
    let cache = f.mkdir(b, "cache");
    f.write(cache, "k.bin", "KKK");
    let mut exclusions = ExclusionSet::new();
    exclusions.insert(&normalize_path(&f.source.join("b/cache")));
    exclusions.save(&f.layout().exclusions_file()).unwrap();
    f.run("S1", true);
    assert!(fs::symlink_metadata(f.snap("S1").join("b/cache")).is_err());

    fs::remove_file(f.layout().exclusions_file()).unwrap();
    let report = f.run("S2", true);

    let s2 = f.snap("S2");
    assert_eq!(fs::read_to_string(s2.join("b/cache/k.bin")).unwrap(), "KKK");
    assert!(!is_symlink(&s2.join("b")));
    assert_eq!(inode(&s2.join("b/c.txt")), inode(&f.snap("S1").join("b/c.txt")));
    assert_eq!(report.stats.files_copied, 1);
}

#[test]
fn test_added_exclusion_is_not_linked_back() {
    let (mut f, _, b, _) = Fixture::seeded();
    let cache = f.mkdir(b, "cache");
    f.write(cache, "k.bin", "KKK");
    f.run("S1", true);

    let mut exclusions = ExclusionSet::new();
    exclusions.insert(&normalize_path(&f.source.join("b/cache")));
    exclusions.save(&f.layout().exclusions_file()).unwrap();
    let report = f.run("S2", true);

    let s2 = f.snap("S2");
    assert!(!is_symlink(&s2.join("b")));
    assert!(fs::symlink_metadata(s2.join("b/cache")).is_err());
    assert_eq!(fs::read_to_string(s2.join("b/c.txt")).unwrap(), "CCC");
    assert_eq!(report.stats.excluded, 1);

    // Unchanged exclusions on the next run allow reuse again
    let report = f.run("S3", true);
    assert!(is_symlink(&f.snap("S3").join("b")));
    assert_eq!(report.journal, JournalMode::Incremental { changed_paths: 0 });
}

#[test]
fn test_new_file_in_unchanged_directory() {
    let (mut f, _, b, _) = Fixture::seeded();
    f.run("S1", true);

    f.write(b, "new.txt", "NEW");
    let report = f.run("S2", true);

    let s2 = f.snap("S2");
    assert!(!is_symlink(&s2.join("b")));
    assert_eq!(fs::read_to_string(s2.join("b/new.txt")).unwrap(), "NEW");
    assert_eq!(inode(&s2.join("b/c.txt")), inode(&f.snap("S1").join("b/c.txt")));
    assert_eq!(report.stats.files_copied, 1);
}

#[test]
fn test_file_reuse_without_directory_reuse() {
    let (f, _, _, _) = Fixture::seeded();
    f.run("S1", false);

    let report = f.run("S2", false);

    let s2 = f.snap("S2");
    assert!(!is_symlink(&s2.join("b")));
    assert_eq!(inode(&s2.join("b/c.txt")), inode(&f.snap("S1").join("b/c.txt")));
    assert_eq!(report.stats.files_linked, 2);
    assert_eq!(report.stats.dirs_linked, 0);
    assert_eq!(report.stats.dirs_created, 2);
}

#[test]
fn test_empty_source_gives_empty_snapshot() {
    let f = Fixture::new();

    let report = f.run("S1", true);

    assert!(f.snap("S1").is_dir());
    assert_eq!(fs::read_dir(f.snap("S1")).unwrap().count(), 0);
    assert_eq!(report.stats.dirs_created, 1);
}

#[test]
fn test_excluded_source_root_gives_empty_snapshot() {
    let (f, _, _, _) = Fixture::seeded();
    let mut exclusions = ExclusionSet::new();
    exclusions.insert(&normalize_path(&f.source));
    fs::create_dir_all(&f.target).unwrap();
    exclusions.save(&f.layout().exclusions_file()).unwrap();

    f.run("S1", true);

    assert!(f.snap("S1").is_dir());
    assert_eq!(fs::read_dir(f.snap("S1")).unwrap().count(), 0);
}

#[test]
fn test_target_inside_source_is_not_recursed() {
    let (mut f, _, _, _) = Fixture::seeded();
    f.target = f.source.join("backups");

    let report = f.run("S1", false);

    assert!(!f.snap("S1").join("backups").exists());
    assert_eq!(report.stats.excluded, 1);
    assert_eq!(report.stats.files_copied, 2);
}

#[test]
fn test_missing_previous_snapshot_disables_reuse() {
    let (f, _, _, _) = Fixture::seeded();
    f.run("S1", true);
    fs::remove_dir_all(f.snap("S1")).unwrap();

    let report = f.run("S2", true);

    assert_eq!(report.baseline, None);
    assert_eq!(report.stats.linked(), 0);
    assert_eq!(report.stats.files_copied, 2);
    assert!(!f.notifier.messages(Level::Warning).is_empty());
}

#[test]
fn test_journal_disabled_copies_everything() {
    let (f, _, _, _) = Fixture::seeded();
    f.run("S1", true);
    let state = f.journal_state();

    let mut options = f.options("S2", true);
    options.use_journal = false;
    let report = f.run_with(&options).unwrap();

    assert_eq!(report.journal, JournalMode::Disabled);
    assert_eq!(report.stats.linked(), 0);
    // Cursor carried forward unchanged
    assert_eq!(f.journal_state(), state);
    assert_eq!(f.previous().as_deref(), Some("S2"));
}

#[test]
fn test_unavailable_journal_copies_everything() {
    let (f, _, _, _) = Fixture::seeded();
    f.volume.forbid_create();

    let report = f.run("S1", true);

    assert_eq!(report.journal, JournalMode::Unavailable);
    assert_eq!(report.stats.files_copied, 2);
    assert_eq!(f.journal_state(), JournalState::default());
}

#[test]
fn test_existing_snapshot_name_is_fatal() {
    let (f, _, _, _) = Fixture::seeded();
    f.run("S1", true);

    let err = f.run_with(&f.options("S1", true)).unwrap_err();

    assert!(matches!(err, SnapshotError::TargetExists(_)));
    assert_eq!(f.previous().as_deref(), Some("S1"));
}

#[test]
fn test_missing_source_is_fatal() {
    let mut f = Fixture::new();
    f.source = f.source.join("nope");

    let err = f.run_with(&f.options("S1", true)).unwrap_err();

    assert!(matches!(err, SnapshotError::SourceMissing(_)));
    assert!(!f.snap("S1").exists());
}

#[test]
fn test_read_error_aborts_without_commit() {
    let (f, a, _, _) = Fixture::seeded();
    f.run("S1", true);
    let state = f.journal_state();

    f.overwrite(a, "AAA2");
    f.volume.fail_reads(true);
    let err = f.run_with(&f.options("S2", true)).unwrap_err();

    assert!(matches!(err, SnapshotError::Journal(_)));
    assert_eq!(f.previous().as_deref(), Some("S1"));
    assert_eq!(f.journal_state(), state);
}

#[test]
fn test_cancelled_run_does_not_commit() {
    let (f, _, _, _) = Fixture::seeded();
    f.run("S1", true);

    let cancel = AtomicBool::new(true);
    let err = run_snapshot(
        &f.options("S2", true),
        Some(&f.volume),
        &NativeLinker,
        &f.notifier,
        &cancel,
    )
    .unwrap_err();

    assert!(matches!(err, SnapshotError::Cancelled));
    assert!(f.snap("S2").is_dir());
    assert_eq!(f.previous().as_deref(), Some("S1"));
}
