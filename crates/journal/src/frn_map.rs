//! FRN map: file reference number -> (parent, name)

use crate::record::Frn;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Walks longer than this are treated as a cycle
pub const MAX_DEPTH: usize = 4096;

/// Parent and name of a directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrnEntry {
    pub parent: Frn,
    pub name: String,
}

/// Persistent mapping used to reconstruct paths from FRNs
///
/// Entries of deleted directories are left in place; they are only reached
/// through stale parent links and never through a live traversal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrnMap {
    entries: AHashMap<Frn, FrnEntry>,
}

impl FrnMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `frn`
    pub fn set(&mut self, frn: Frn, parent: Frn, name: impl Into<String>) {
        self.entries.insert(
            frn,
            FrnEntry {
                parent,
                name: name.into(),
            },
        );
    }

    pub fn get(&self, frn: Frn) -> Option<&FrnEntry> {
        self.entries.get(&frn)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reconstruct `/name_n/.../name_0` for `frn`
    ///
    /// The walk stops at the first FRN without an entry, which is treated
    /// as the root, so an unknown FRN yields `""`. Returns `None` when the
    /// walk exceeds [`MAX_DEPTH`] (a cycle).
    pub fn resolve(&self, frn: Frn) -> Option<String> {
        let mut names: SmallVec<[&str; 32]> = SmallVec::new();
        let mut current = frn;

        while let Some(entry) = self.entries.get(&current) {
            if names.len() >= MAX_DEPTH {
                return None;
            }
            names.push(entry.name.as_str());
            current = entry.parent;
        }

        let mut path = String::with_capacity(names.iter().map(|n| n.len() + 1).sum());
        for name in names.iter().rev() {
            path.push('/');
            path.push_str(name);
        }
        Some(path)
    }

    /// Like [`resolve`](Self::resolve), but a cycle yields `""`
    pub fn build_path(&self, frn: Frn) -> String {
        self.resolve(frn).unwrap_or_default()
    }
}

impl PartialEq for FrnMap {
    fn eq(&self, other: &Self) -> bool {
        *self.entries == *other.entries
    }
}

impl Eq for FrnMap {}
