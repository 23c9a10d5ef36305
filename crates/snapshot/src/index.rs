//! Snapshot index: the state that chains snapshots together
//!
//! Three files in the target directory:
//! - `previous`: name of the last committed snapshot and the exclusions it
//!   was taken with
//! - `journal`: journal cursor and FRN map
//! - `exclusions`: excluded paths, one per line
//!
//! Commit writes `previous` before `journal`, each atomically. A crash in
//! between leaves the old cursor next to the new pointer, which at worst
//! replays more of the journal than needed.

use crate::exclusions::ExclusionSet;
use journal::JournalState;
use lb_core::store::{read_state, write_state, TargetLayout};
use lb_core::{normalize_path, BlobKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Contents of the `previous` file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PreviousRecord {
    name: String,
    exclusions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotIndex {
    /// Last committed snapshot
    pub previous: Option<String>,
    pub journal: JournalState,
    /// Loaded exclusions plus the target directory itself
    pub exclusions: ExclusionSet,
    /// Exclusions in force when `previous` was taken
    pub previous_exclusions: ExclusionSet,
}

impl SnapshotIndex {
    /// Load the index of a target directory
    ///
    /// Missing files give empty values; corrupt files are errors.
    pub fn load(layout: &TargetLayout) -> lb_core::Result<Self> {
        let record: Option<PreviousRecord> = read_state(&layout.previous_file(), BlobKind::Previous)?;
        let journal = JournalState::load(&layout.journal_file())?;
        let mut exclusions = ExclusionSet::load(&layout.exclusions_file())?;

        // Snapshots live under the target; never recurse into them
        exclusions.insert(&normalize_path(layout.root()));

        let (previous, previous_exclusions) = match record {
            Some(record) => {
                let mut set = ExclusionSet::new();
                for path in &record.exclusions {
                    set.insert(path);
                }
                (Some(record.name), set)
            }
            None => (None, ExclusionSet::new()),
        };

        debug!(
            "Loaded index: previous {:?}, {} FRN entries, {} exclusions",
            previous,
            journal.frn_map.len(),
            exclusions.len()
        );

        Ok(Self {
            previous,
            journal,
            exclusions,
            previous_exclusions,
        })
    }

    /// Paths excluded now but not when `previous` was taken, or the reverse
    pub fn exclusion_changes(&self) -> Vec<String> {
        self.exclusions
            .difference(&self.previous_exclusions)
            .chain(self.previous_exclusions.difference(&self.exclusions))
            .map(str::to_string)
            .collect()
    }

    /// Point `previous` at `name` with the current exclusions, then persist
    /// the journal state
    pub fn commit(
        &mut self,
        layout: &TargetLayout,
        name: &str,
        journal: JournalState,
    ) -> lb_core::Result<()> {
        let record = PreviousRecord {
            name: name.to_string(),
            exclusions: self.exclusions.iter().map(str::to_string).collect(),
        };
        write_state(&layout.previous_file(), BlobKind::Previous, &record)?;
        journal.save(&layout.journal_file())?;

        self.journal = journal;
        self.previous = Some(name.to_string());
        self.previous_exclusions = self.exclusions.clone();
        Ok(())
    }
}
