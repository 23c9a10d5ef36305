//! Shared building blocks for linkback
//!
//! This crate provides:
//! - The versioned blob codec used for `previous` and `journal` state files
//! - Target directory layout and crash-safe state writes
//! - Path normalization shared by the journal tracker and the walker
//! - The notification sink passed into the tracker and walker

pub mod codec;
pub mod error;
pub mod notify;
pub mod store;

// Re-exports
pub use codec::{decode, encode, BlobKind};
pub use error::{CodecError, CoreError};
pub use notify::{Event, Level, Notifier, RecordingNotifier, TracingNotifier};
pub use store::{
    atomic_write, normalize_path, normalize_str, read_state, write_state, TargetLayout,
};

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
