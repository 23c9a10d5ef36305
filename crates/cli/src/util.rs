//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Format byte size in human-readable form
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Snapshot name for the current local time, `YYYYMMDD-HHMMSS`
pub fn default_snapshot_name() -> String {
    chrono::Local::now().format("%Y%m%d-%H%M%S").to_string()
}

/// Absolute form of `path`, resolving symlinks when it exists
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    match std::fs::canonicalize(path) {
        Ok(resolved) => Ok(resolved),
        Err(_) => std::path::absolute(path)
            .with_context(|| format!("Cannot make {} absolute", path.display())),
    }
}
