use crate::record::{Frn, Usn};
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("change journal is not active on this volume")]
    NotFound,

    #[error("change journal unavailable: {0}")]
    Unavailable(String),

    #[error("undecodable name in record for FRN {frn:#x} (parent {parent_frn:#x}) at USN {usn}")]
    Encoding { frn: Frn, parent_frn: Frn, usn: Usn },

    #[error("malformed journal data: {0}")]
    Parse(String),

    #[error("journal I/O error: {0}")]
    Io(#[from] io::Error),
}

impl JournalError {
    /// Errors that drop a single record instead of aborting the read
    pub fn is_record_local(&self) -> bool {
        matches!(self, JournalError::Encoding { .. })
    }
}
