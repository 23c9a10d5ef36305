//! In-memory change journal
//!
//! Simulates a volume with a change journal: live file records, an append-only
//! record log, journal recreation (new journal id), purging of old records and
//! injected failures. Handles are cheap clones sharing one volume, so a test
//! can keep mutating the volume between tracker runs.

use crate::error::JournalError;
use crate::record::{reason, ChangeRecord, Frn, JournalInfo, Usn, FILE_ATTRIBUTE_DIRECTORY};
use crate::volume::{RecordIter, Volume, VolumeProvider};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// FRN of the volume root
pub const ROOT_FRN: Frn = 5;

const FILE_ATTRIBUTE_ARCHIVE: u32 = 0x0000_0020;

#[derive(Debug, Clone)]
struct LiveEntry {
    parent: Frn,
    name: String,
    attributes: u32,
    last_usn: Usn,
}

#[derive(Debug)]
struct JournalInstance {
    id: u64,
    first_usn: Usn,
    records: Vec<ChangeRecord>,
}

#[derive(Debug)]
struct Inner {
    live: BTreeMap<Frn, LiveEntry>,
    journal: Option<JournalInstance>,
    next_usn: Usn,
    next_frn: Frn,
    next_journal_id: u64,
    creatable: bool,
    failing_queries: u32,
    failing_reads: bool,
    opens_fail: bool,
    bad_names: HashSet<Frn>,
}

/// Shared handle to a simulated volume
#[derive(Debug, Clone)]
pub struct MemoryJournal {
    mount: String,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryJournal {
    /// A volume mounted at `mount` (a normalized path, `""` for `/`) with
    /// no journal yet
    pub fn new(mount: impl Into<String>) -> Self {
        let mut live = BTreeMap::new();
        live.insert(
            ROOT_FRN,
            LiveEntry {
                parent: ROOT_FRN,
                name: String::new(),
                attributes: FILE_ATTRIBUTE_DIRECTORY,
                last_usn: 0,
            },
        );

        Self {
            mount: mount.into(),
            inner: Arc::new(Mutex::new(Inner {
                live,
                journal: None,
                next_usn: 0,
                next_frn: 0x100,
                next_journal_id: 1,
                creatable: true,
                failing_queries: 0,
                failing_reads: false,
                opens_fail: false,
                bad_names: HashSet::new(),
            })),
        }
    }

    pub fn root(&self) -> Frn {
        ROOT_FRN
    }

    /// Id of the current journal, if one exists
    pub fn journal_id(&self) -> Option<u64> {
        self.inner.lock().journal.as_ref().map(|j| j.id)
    }

    pub fn next_usn(&self) -> Usn {
        self.inner.lock().next_usn
    }

    pub fn create_dir(&self, parent: Frn, name: &str) -> Frn {
        self.add_entry(parent, name, FILE_ATTRIBUTE_DIRECTORY)
    }

    pub fn create_file(&self, parent: Frn, name: &str) -> Frn {
        self.add_entry(parent, name, FILE_ATTRIBUTE_ARCHIVE)
    }

    /// Record a content change
    pub fn modify(&self, frn: Frn) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.live.get(&frn).cloned() {
            inner.log(frn, &entry, reason::DATA_EXTEND | reason::DATA_OVERWRITE | reason::CLOSE);
        }
    }

    /// Record a change no snapshot cares about
    pub fn change_security(&self, frn: Frn) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.live.get(&frn).cloned() {
            inner.log(frn, &entry, reason::SECURITY_CHANGE);
        }
    }

    /// Move and/or rename, logging the old-name and new-name records
    pub fn rename(&self, frn: Frn, new_parent: Frn, new_name: &str) {
        let mut inner = self.inner.lock();
        let Some(old) = inner.live.get(&frn).cloned() else {
            return;
        };
        inner.log(frn, &old, reason::RENAME_OLD_NAME);

        let new = LiveEntry {
            parent: new_parent,
            name: new_name.to_string(),
            ..old
        };
        inner.log(frn, &new, reason::RENAME_NEW_NAME | reason::CLOSE);
        inner.live.insert(frn, new);
    }

    pub fn delete(&self, frn: Frn) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.live.remove(&frn) {
            inner.log(frn, &entry, reason::FILE_DELETE | reason::CLOSE);
        }
    }

    /// Delete the journal and create a new one with a fresh id
    pub fn recreate_journal(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.journal = None;
        inner.create_journal();
        inner.journal.as_ref().map(|j| j.id).unwrap_or_default()
    }

    /// Drop records below `usn`, as a size-capped journal does
    pub fn purge_before(&self, usn: Usn) {
        let mut inner = self.inner.lock();
        let next_usn = inner.next_usn;
        if let Some(journal) = inner.journal.as_mut() {
            journal.records.retain(|r| r.usn >= usn);
            journal.first_usn = usn.min(next_usn);
        }
    }

    /// Make the next `count` queries fail
    pub fn fail_queries(&self, count: u32) {
        self.inner.lock().failing_queries = count;
    }

    /// Make journal creation impossible
    pub fn forbid_create(&self) {
        self.inner.lock().creatable = false;
    }

    /// Make record feeds fail part-way
    pub fn fail_reads(&self, failing: bool) {
        self.inner.lock().failing_reads = failing;
    }

    pub fn fail_open(&self, failing: bool) {
        self.inner.lock().opens_fail = failing;
    }

    /// Report records for `frn` as undecodable
    pub fn corrupt_name(&self, frn: Frn) {
        self.inner.lock().bad_names.insert(frn);
    }

    fn add_entry(&self, parent: Frn, name: &str, attributes: u32) -> Frn {
        let mut inner = self.inner.lock();
        let frn = inner.next_frn;
        inner.next_frn += 1;

        let entry = LiveEntry {
            parent,
            name: name.to_string(),
            attributes,
            last_usn: 0,
        };
        inner.log(frn, &entry, reason::FILE_CREATE | reason::CLOSE);
        inner.live.insert(frn, entry);
        frn
    }
}

impl Inner {
    fn log(&mut self, frn: Frn, entry: &LiveEntry, reason: u32) {
        let usn = self.next_usn;
        self.next_usn += 1;

        if let Some(live) = self.live.get_mut(&frn) {
            live.last_usn = usn;
        }
        if let Some(journal) = self.journal.as_mut() {
            journal.records.push(ChangeRecord {
                usn,
                frn,
                parent_frn: entry.parent,
                name: entry.name.clone(),
                attributes: entry.attributes,
                reason,
            });
        }
    }

    fn create_journal(&mut self) {
        let id = self.next_journal_id;
        self.next_journal_id += 1;
        self.journal = Some(JournalInstance {
            id,
            first_usn: self.next_usn,
            records: Vec::new(),
        });
    }

    fn checked(&self, record: ChangeRecord) -> Result<ChangeRecord, JournalError> {
        if self.bad_names.contains(&record.frn) {
            Err(JournalError::Encoding {
                frn: record.frn,
                parent_frn: record.parent_frn,
                usn: record.usn,
            })
        } else {
            Ok(record)
        }
    }

    fn feed(&self, records: Vec<ChangeRecord>) -> Vec<Result<ChangeRecord, JournalError>> {
        let mut out: Vec<_> = records
            .into_iter()
            .map(|r| self.checked(r))
            .collect();
        if self.failing_reads {
            let at = out.len() / 2;
            out.insert(at, Err(JournalError::Io(std::io::Error::other("injected read failure"))));
            out.truncate(at + 1);
        }
        out
    }
}

impl Volume for MemoryJournal {
    fn query(&mut self) -> Result<JournalInfo, JournalError> {
        let mut inner = self.inner.lock();
        if inner.failing_queries > 0 {
            inner.failing_queries -= 1;
            return Err(JournalError::Unavailable("injected query failure".to_string()));
        }

        match inner.journal.as_ref() {
            Some(journal) => Ok(JournalInfo {
                journal_id: journal.id,
                first_usn: journal.first_usn,
                next_usn: inner.next_usn,
            }),
            None => Err(JournalError::NotFound),
        }
    }

    fn create(&mut self) -> Result<(), JournalError> {
        let mut inner = self.inner.lock();
        if !inner.creatable {
            return Err(JournalError::Unavailable("journal creation refused".to_string()));
        }
        if inner.journal.is_none() {
            inner.create_journal();
        }
        Ok(())
    }

    fn enumerate(&mut self, high_usn: Usn) -> Result<RecordIter<'_>, JournalError> {
        let inner = self.inner.lock();
        let records: Vec<_> = inner
            .live
            .iter()
            .filter(|(_, entry)| entry.last_usn < high_usn || entry.last_usn == 0)
            .map(|(&frn, entry)| ChangeRecord {
                usn: entry.last_usn,
                frn,
                parent_frn: entry.parent,
                name: entry.name.clone(),
                attributes: entry.attributes,
                reason: 0,
            })
            .collect();
        Ok(Box::new(inner.feed(records).into_iter()))
    }

    fn read_from(&mut self, journal_id: u64, start_usn: Usn) -> Result<RecordIter<'_>, JournalError> {
        let inner = self.inner.lock();
        let journal = inner.journal.as_ref().ok_or(JournalError::NotFound)?;
        if journal.id != journal_id {
            return Err(JournalError::Unavailable(format!(
                "journal {:#x} no longer exists",
                journal_id
            )));
        }
        if start_usn < journal.first_usn {
            return Err(JournalError::Unavailable(format!(
                "USN {} has been purged",
                start_usn
            )));
        }

        let records: Vec<_> = journal
            .records
            .iter()
            .filter(|r| r.usn >= start_usn)
            .cloned()
            .collect();
        Ok(Box::new(inner.feed(records).into_iter()))
    }
}

impl VolumeProvider for MemoryJournal {
    fn mount_point(&self) -> &str {
        &self.mount
    }

    fn open(&self) -> Result<Box<dyn Volume + '_>, JournalError> {
        if self.inner.lock().opens_fail {
            return Err(JournalError::Unavailable("injected open failure".to_string()));
        }
        Ok(Box::new(self.clone()))
    }
}
