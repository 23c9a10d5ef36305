//! Journal tracker
//!
//! Consumes the change journal since the stored cursor and produces the set
//! of paths changed since the last committed snapshot, or decides that the
//! cursor is unusable and a full replay is required.

use crate::changed::ChangedPaths;
use crate::error::JournalError;
use crate::frn_map::FrnMap;
use crate::record::{ChangeRecord, Frn, JournalInfo, Usn};
use crate::state::JournalState;
use crate::volume::{Volume, VolumeProvider};
use lb_core::Notifier;
use tracing::{debug, info};

/// What the walker may assume about changes since the previous snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Changes {
    /// No usable journal; nothing may be reused
    Unavailable,
    /// The cursor was discontinuous and everything was replayed; nothing
    /// may be reused. `paths` holds every live path seen.
    ReplayAll { paths: ChangedPaths },
    /// Continuous journal; anything outside the set is unchanged
    Incremental(ChangedPaths),
}

impl Changes {
    pub fn replay_all(&self) -> bool {
        matches!(self, Changes::ReplayAll { .. })
    }

    /// The changed-paths set, when reuse is allowed
    pub fn incremental(&self) -> Option<&ChangedPaths> {
        match self {
            Changes::Incremental(paths) => Some(paths),
            _ => None,
        }
    }
}

/// Result of a tracker run
#[derive(Debug)]
pub struct TrackerOutcome {
    pub changes: Changes,
    /// State to persist once the snapshot commits
    pub state: JournalState,
    /// Records read from the volume
    pub records_seen: u64,
}

/// Drives a volume's change journal against the stored cursor
pub struct JournalTracker<'a> {
    provider: &'a dyn VolumeProvider,
    notifier: &'a dyn Notifier,
}

impl<'a> JournalTracker<'a> {
    pub fn new(provider: &'a dyn VolumeProvider, notifier: &'a dyn Notifier) -> Self {
        Self { provider, notifier }
    }

    /// Process the journal from `state`'s cursor
    ///
    /// Returns the updated state alongside the changes; the caller persists
    /// it only after the snapshot commits. An error means the journal broke
    /// mid-read and the snapshot must be aborted.
    pub fn process(&self, state: JournalState) -> Result<TrackerOutcome, JournalError> {
        let mut volume = match self.provider.open() {
            Ok(volume) => volume,
            Err(e) => {
                self.notifier
                    .warning(&format!("Cannot open volume, snapshot will copy everything: {}", e));
                return Ok(unavailable(state));
            }
        };

        let Some(info) = self.query_or_create(volume.as_mut()) else {
            return Ok(unavailable(state));
        };

        debug!(
            "Journal {:#x}: first USN {}, next USN {}",
            info.journal_id, info.first_usn, info.next_usn
        );

        if state.is_continuous(info.journal_id, info.first_usn) {
            self.read_incremental(volume.as_mut(), state)
        } else {
            self.notifier.notice(&format!(
                "Journal cursor not continuous (stored {}, volume {:#x} from USN {}), replaying all records",
                describe_cursor(&state),
                info.journal_id,
                info.first_usn
            ));
            self.replay_all(volume.as_mut(), state, info)
        }
    }

    /// Query the journal, creating it and retrying once on failure
    fn query_or_create(&self, volume: &mut dyn Volume) -> Option<JournalInfo> {
        let first_err = match volume.query() {
            Ok(info) => return Some(info),
            Err(e) => e,
        };
        debug!("Journal query failed ({}), creating journal", first_err);

        if let Err(e) = volume.create() {
            self.notifier
                .warning(&format!("Cannot create change journal, snapshot will copy everything: {}", e));
            return None;
        }

        match volume.query() {
            Ok(info) => Some(info),
            Err(e) => {
                self.notifier
                    .warning(&format!("Change journal unavailable, snapshot will copy everything: {}", e));
                None
            }
        }
    }

    /// Two passes over every live record: directories first, then paths
    fn replay_all(
        &self,
        volume: &mut dyn Volume,
        mut state: JournalState,
        info: JournalInfo,
    ) -> Result<TrackerOutcome, JournalError> {
        state.journal_id = Some(info.journal_id);
        state.last_usn = Some(info.first_usn);

        let mut records_seen = 0u64;
        for record in volume.enumerate(info.next_usn)? {
            let Some(record) = self.accept(record)? else {
                continue;
            };
            records_seen += 1;
            if record.is_directory() && !record.is_volume_root() {
                state.frn_map.set(record.frn, record.parent_frn, record.name);
            }
        }

        let mut paths = ChangedPaths::new();
        for record in volume.enumerate(info.next_usn)? {
            let Some(record) = self.accept(record)? else {
                continue;
            };
            if let Some(path) = self.record_path(&state.frn_map, &record) {
                paths.insert(path);
            }
        }
        paths.flesh_out();

        state.last_usn = Some(info.next_usn);
        info!(
            "Full replay: {} records, {} directories mapped, {} paths",
            records_seen,
            state.frn_map.len(),
            paths.len()
        );

        Ok(TrackerOutcome {
            changes: Changes::ReplayAll { paths },
            state,
            records_seen,
        })
    }

    /// Single pass from the stored cursor to the end of the journal
    ///
    /// The cursor moves one past the highest USN read, so the next run
    /// starts at the first record it has not seen.
    fn read_incremental(
        &self,
        volume: &mut dyn Volume,
        mut state: JournalState,
    ) -> Result<TrackerOutcome, JournalError> {
        let (Some(journal_id), Some(start)) = (state.journal_id, state.last_usn) else {
            return Err(JournalError::Parse("incremental read without a cursor".to_string()));
        };

        let mut paths = ChangedPaths::new();
        let mut records_seen = 0u64;
        let mut resume = start;

        for record in volume.read_from(journal_id, start)? {
            let record = match record {
                Ok(record) => record,
                Err(JournalError::Encoding {
                    frn,
                    parent_frn,
                    usn,
                }) => {
                    self.warn_dropped(frn, usn);
                    resume = resume.max(usn.saturating_add(1));
                    // The entry has no usable name, so nothing in its directory may be reused
                    let dir = self.dir_path(&state.frn_map, parent_frn);
                    debug!("Marking {} as changed after dropped record", dir);
                    paths.insert_subtree(dir);
                    continue;
                }
                Err(e) => return Err(e),
            };
            records_seen += 1;
            resume = resume.max(record.usn.saturating_add(1));

            if !record.is_interesting() {
                continue;
            }
            if let Some(path) = self.record_path(&state.frn_map, &record) {
                // Everything below a renamed directory changes identity with it
                if record.is_directory() && record.is_rename() {
                    paths.insert_subtree(path);
                } else {
                    paths.insert(path);
                }
            }
            if record.is_directory() && !record.is_volume_root() {
                state.frn_map.set(record.frn, record.parent_frn, record.name);
            }
        }

        let raw = paths.len();
        paths.flesh_out();
        state.last_usn = Some(resume);

        info!(
            "Incremental journal read: {} records, {} changed paths ({} after flesh-out)",
            records_seen,
            raw,
            paths.len()
        );

        Ok(TrackerOutcome {
            changes: Changes::Incremental(paths),
            state,
            records_seen,
        })
    }

    /// Pass records through, dropping undecodable ones with a warning
    fn accept(
        &self,
        record: Result<ChangeRecord, JournalError>,
    ) -> Result<Option<ChangeRecord>, JournalError> {
        match record {
            Ok(record) => Ok(Some(record)),
            Err(JournalError::Encoding { frn, usn, .. }) => {
                self.warn_dropped(frn, usn);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn warn_dropped(&self, frn: Frn, usn: Usn) {
        self.notifier.warning(&format!(
            "Dropping journal record for FRN {:#x} at USN {}: undecodable name",
            frn, usn
        ));
    }

    /// Absolute normalized path of a directory; the volume root when its
    /// parent chain cannot be followed
    fn dir_path(&self, map: &FrnMap, frn: Frn) -> String {
        let mount = self.provider.mount_point();
        let path = match map.resolve(frn) {
            Some(rel) => format!("{}{}", mount, rel),
            None => mount.to_string(),
        };
        if path.is_empty() {
            "/".to_string()
        } else {
            path
        }
    }

    /// Absolute normalized path of the entry a record describes
    fn record_path(&self, map: &FrnMap, record: &ChangeRecord) -> Option<String> {
        if record.name.is_empty() || record.is_volume_root() {
            return None;
        }

        let Some(parent) = map.resolve(record.parent_frn) else {
            self.notifier.warning(&format!(
                "Cannot reconstruct path of {:?} (FRN {:#x}): parent chain too deep",
                record.name, record.frn
            ));
            return None;
        };

        Some(format!(
            "{}{}/{}",
            self.provider.mount_point(),
            parent,
            record.name
        ))
    }
}

fn unavailable(state: JournalState) -> TrackerOutcome {
    TrackerOutcome {
        changes: Changes::Unavailable,
        state,
        records_seen: 0,
    }
}

fn describe_cursor(state: &JournalState) -> String {
    match (state.journal_id, state.last_usn) {
        (Some(id), Some(usn)) => format!("{:#x}@{}", id, usn),
        _ => "none".to_string(),
    }
}
