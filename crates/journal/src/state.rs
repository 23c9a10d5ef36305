//! Persisted journal state: cursor plus FRN map

use crate::frn_map::FrnMap;
use crate::record::Usn;
use lb_core::codec::BlobKind;
use lb_core::store::{read_state, write_state};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Journal cursor and the FRN map consistent with it
///
/// Advanced only when a snapshot commits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalState {
    /// Journal instance the cursor belongs to
    pub journal_id: Option<u64>,
    /// USN the next incremental read starts from
    pub last_usn: Option<Usn>,
    /// Directory identities seen so far
    pub frn_map: FrnMap,
}

impl JournalState {
    /// Load from the `journal` state file; a missing file gives the empty state
    pub fn load(path: &Path) -> lb_core::Result<Self> {
        Ok(read_state(path, BlobKind::Journal)?.unwrap_or_default())
    }

    /// Write atomically to the `journal` state file
    pub fn save(&self, path: &Path) -> lb_core::Result<()> {
        write_state(path, BlobKind::Journal, self)
    }

    /// Whether this cursor can be continued on a journal reporting
    /// `journal_id` whose oldest retained record is `first_usn`
    pub fn is_continuous(&self, journal_id: u64, first_usn: Usn) -> bool {
        match (self.journal_id, self.last_usn) {
            (Some(id), Some(last)) => id == journal_id && first_usn <= last,
            _ => false,
        }
    }
}
