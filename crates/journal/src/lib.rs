//! Change-journal tracking for linkback
//!
//! This crate provides:
//! - Typed change records and the platform adapter traits (`Volume`)
//! - The FRN map used to turn file reference numbers into paths
//! - The ancestor-closed changed-paths set
//! - The persisted journal state (cursor + FRN map)
//! - The journal tracker that decides between incremental and full replay
//! - An in-memory journal for tests and embedders

pub mod changed;
pub mod error;
pub mod frn_map;
pub mod memory;
pub mod record;
pub mod state;
pub mod tracker;
pub mod volume;

// Re-exports
pub use changed::ChangedPaths;
pub use error::JournalError;
pub use frn_map::{FrnEntry, FrnMap};
pub use memory::MemoryJournal;
pub use record::{ChangeRecord, Frn, JournalInfo, Usn};
pub use state::JournalState;
pub use tracker::{Changes, JournalTracker, TrackerOutcome};
pub use volume::{RecordIter, Volume, VolumeProvider};

/// Result type for journal operations
pub type Result<T> = std::result::Result<T, JournalError>;
