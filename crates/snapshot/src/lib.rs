//! Snapshot engine for linkback
//!
//! This crate provides:
//! - The exclusion set and the snapshot index stored in the target directory
//! - The walker that copies or links each source entry into a new snapshot
//! - `run_snapshot`, which ties the journal tracker, walker and index together

pub mod error;
pub mod exclusions;
pub mod index;
pub mod run;
pub mod stats;
pub mod walker;

pub use error::SnapshotError;
pub use exclusions::ExclusionSet;
pub use index::SnapshotIndex;
pub use run::{run_snapshot, validate_name, JournalMode, SnapshotOptions, SnapshotReport};
pub use stats::WalkStats;
pub use walker::{WalkOptions, Walker};

/// Result type for snapshot operations
pub type Result<T> = std::result::Result<T, SnapshotError>;
