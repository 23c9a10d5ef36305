//! Counters for a single walk

/// What the walker did, entry by entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub files_copied: u64,
    pub bytes_copied: u64,
    pub files_linked: u64,
    pub dirs_linked: u64,
    pub dirs_created: u64,
    /// Entries omitted because they are in the exclusion set
    pub excluded: u64,
    /// Unreadable or unsupported entries
    pub skipped: u64,
    pub warnings: u64,
}

impl WalkStats {
    /// Entries materialized or deliberately left out
    pub fn entries(&self) -> u64 {
        self.files_copied
            + self.files_linked
            + self.dirs_linked
            + self.dirs_created
            + self.excluded
            + self.skipped
    }

    pub fn linked(&self) -> u64 {
        self.files_linked + self.dirs_linked
    }
}
