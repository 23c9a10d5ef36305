//! Exclusion list for linkback
//!
//! The `exclusions` file in the target directory holds one absolute path
//! per line. Matching is exact: an excluded directory's subtree is never
//! visited, so its descendants need no entries of their own.
//!
//! File rules:
//! - Surrounding whitespace is trimmed and CRLF line endings are accepted
//! - Empty lines and lines starting with `#` are ignored
//! - Paths are normalized (forward slashes, no trailing separator)

use lb_core::{atomic_write, normalize_path, normalize_str, CoreError};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

/// Normalized absolute paths whose subtrees are omitted from snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    paths: BTreeSet<String>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the text of an exclusions file
    pub fn parse(text: &str) -> Self {
        let paths = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(normalize_str)
            .collect();
        Self { paths }
    }

    /// Load from `path`; a missing file is an empty set
    pub fn load(path: &Path) -> lb_core::Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(CoreError::io(path, e)),
        }
    }

    /// Write atomically, one path per line
    pub fn save(&self, path: &Path) -> lb_core::Result<()> {
        atomic_write(path, self.to_text().as_bytes())
    }

    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for path in &self.paths {
            text.push_str(path);
            text.push('\n');
        }
        text
    }

    /// Add a path, normalizing it; returns false if it was already present
    pub fn insert(&mut self, path: &str) -> bool {
        self.paths.insert(normalize_str(path))
    }

    pub fn remove(&mut self, path: &str) -> bool {
        self.paths.remove(&normalize_str(path))
    }

    /// Exact match against an already-normalized path
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn contains_path(&self, path: &Path) -> bool {
        self.contains(&normalize_path(path))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    /// Paths in this set but not in `other`
    pub fn difference<'a>(&'a self, other: &'a ExclusionSet) -> impl Iterator<Item = &'a str> {
        self.paths.difference(&other.paths).map(String::as_str)
    }
}
