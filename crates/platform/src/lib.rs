//! Platform adapter for linkback
//!
//! This crate provides:
//! - Decoding of raw change-journal buffers into typed records
//! - The Windows volume adapter (USN journal ioctls)
//! - Hard links and directory links, with a junction fallback on Windows

pub mod decode;
pub mod links;
#[cfg(windows)]
pub mod windows;

pub use links::{Linker, NativeLinker};

use journal::VolumeProvider;
use std::path::Path;

/// The change-journal adapter for the volume holding `source_root`
///
/// `None` when the platform has no change journal support.
pub fn provider_for(source_root: &Path) -> Option<Box<dyn VolumeProvider>> {
    #[cfg(windows)]
    {
        windows::UsnVolumeProvider::for_path(source_root)
            .map(|p| Box::new(p) as Box<dyn VolumeProvider>)
    }
    #[cfg(not(windows))]
    {
        tracing::debug!(
            "No change journal support for {} on this platform",
            source_root.display()
        );
        None
    }
}
