//! Change record data structures

use serde::{Deserialize, Serialize};

/// Update sequence number: position in the change journal
pub type Usn = u64;

/// File reference number: stable per-volume identity of a file or directory
pub type Frn = u64;

/// Attribute bit marking a directory
pub const FILE_ATTRIBUTE_DIRECTORY: u32 = 0x0000_0010;

/// Reason bits carried by change records
pub mod reason {
    pub const DATA_OVERWRITE: u32 = 0x0000_0001;
    pub const DATA_EXTEND: u32 = 0x0000_0002;
    pub const DATA_TRUNCATION: u32 = 0x0000_0004;
    pub const FILE_CREATE: u32 = 0x0000_0100;
    pub const FILE_DELETE: u32 = 0x0000_0200;
    pub const SECURITY_CHANGE: u32 = 0x0000_0800;
    pub const RENAME_OLD_NAME: u32 = 0x0000_1000;
    pub const RENAME_NEW_NAME: u32 = 0x0000_2000;
    pub const BASIC_INFO_CHANGE: u32 = 0x0000_8000;
    pub const CLOSE: u32 = 0x8000_0000;

    /// Reasons that can change what a snapshot would contain
    pub const INTERESTING: u32 = BASIC_INFO_CHANGE
        | CLOSE
        | DATA_EXTEND
        | DATA_OVERWRITE
        | DATA_TRUNCATION
        | FILE_CREATE
        | FILE_DELETE
        | RENAME_NEW_NAME
        | RENAME_OLD_NAME;
}

/// A single record from the change journal (or from a full enumeration)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Position in the journal (0 for enumeration records)
    pub usn: Usn,
    /// Identity of the file or directory
    pub frn: Frn,
    /// Identity of the containing directory
    pub parent_frn: Frn,
    /// Name within the parent
    pub name: String,
    /// File attribute flags
    pub attributes: u32,
    /// Reason mask
    pub reason: u32,
}

impl ChangeRecord {
    pub fn is_directory(&self) -> bool {
        self.attributes & FILE_ATTRIBUTE_DIRECTORY != 0
    }

    /// Whether the reason mask intersects [`reason::INTERESTING`]
    pub fn is_interesting(&self) -> bool {
        self.reason & reason::INTERESTING != 0
    }

    /// Whether the record is either half of a rename or move
    pub fn is_rename(&self) -> bool {
        self.reason & (reason::RENAME_OLD_NAME | reason::RENAME_NEW_NAME) != 0
    }

    /// The volume root refers to itself as its parent
    pub fn is_volume_root(&self) -> bool {
        self.frn == self.parent_frn
    }
}

/// Journal state as reported by the volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalInfo {
    /// Identifies the journal instance
    pub journal_id: u64,
    /// Oldest USN still present in the journal
    pub first_usn: Usn,
    /// USN the next record will receive
    pub next_usn: Usn,
}
