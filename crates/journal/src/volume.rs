//! Platform adapter interface
//!
//! A `VolumeProvider` opens the volume holding the source tree. The opened
//! `Volume` answers journal queries and hands out lazy record feeds. The
//! handle is dropped (and the volume closed) as soon as the tracker is done.

use crate::error::JournalError;
use crate::record::{ChangeRecord, JournalInfo, Usn};

/// Lazy sequence of change records
pub type RecordIter<'a> = Box<dyn Iterator<Item = Result<ChangeRecord, JournalError>> + 'a>;

/// An open volume with a change journal
pub trait Volume {
    /// Query the current journal; `JournalError::NotFound` when none exists
    fn query(&mut self) -> Result<JournalInfo, JournalError>;

    /// Create the change journal
    fn create(&mut self) -> Result<(), JournalError>;

    /// Enumerate every live file record with a USN below `high_usn`
    ///
    /// Records come with `usn` set to the entry's last USN (0 if unknown)
    /// and an empty reason mask.
    fn enumerate(&mut self, high_usn: Usn) -> Result<RecordIter<'_>, JournalError>;

    /// Read change records of journal `journal_id` from `start_usn` to the
    /// end of the journal
    ///
    /// The feed ends at end-of-data, never on a batch that happens to hold
    /// no records of interest.
    fn read_from(&mut self, journal_id: u64, start_usn: Usn) -> Result<RecordIter<'_>, JournalError>;
}

/// Opens the volume that holds a source tree
pub trait VolumeProvider {
    /// Normalized path of the volume root (`C:` or `/mnt/data`, empty for `/`)
    ///
    /// Prepended to reconstructed paths so they compare equal to the
    /// walker's normalized absolute source paths.
    fn mount_point(&self) -> &str;

    fn open(&self) -> Result<Box<dyn Volume + '_>, JournalError>;
}
