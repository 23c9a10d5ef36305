//! Set of paths changed since the previous snapshot

use lb_core::normalize_path;
use std::collections::BTreeSet;
use std::path::Path;

/// Normalized absolute paths whose content or identity may have changed
///
/// After [`flesh_out`](Self::flesh_out) the set is closed under ancestors:
/// every member's parent directories, up to the volume root, are members too.
///
/// A path inserted as a subtree also covers everything below it. Renamed
/// directories are recorded this way, since every descendant's identity
/// changes with them without a record of its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangedPaths {
    paths: BTreeSet<String>,
    subtrees: BTreeSet<String>,
}

impl ChangedPaths {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an already-normalized path
    pub fn insert(&mut self, path: impl Into<String>) -> bool {
        self.paths.insert(path.into())
    }

    /// Insert an already-normalized path together with everything below it
    pub fn insert_subtree(&mut self, path: impl Into<String>) -> bool {
        let path = path.into();
        self.paths.insert(path.clone());
        self.subtrees.insert(path)
    }

    /// Whether `path` is a member or lies below a changed subtree
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path) || self.in_subtree(path)
    }

    /// Whether `path` or one of its ancestors was inserted as a subtree
    pub fn in_subtree(&self, path: &str) -> bool {
        if self.subtrees.is_empty() {
            return false;
        }
        self.subtrees.contains(path) || ancestors(path).any(|a| self.subtrees.contains(a))
    }

    pub fn subtree_count(&self) -> usize {
        self.subtrees.len()
    }

    /// Membership test for a filesystem path, normalizing it first
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

    /// Add every ancestor of every member
    pub fn flesh_out(&mut self) {
        let mut ancestors_found = BTreeSet::new();
        for path in &self.paths {
            for ancestor in ancestors(path) {
                if self.paths.contains(ancestor) {
                    continue;
                }
                ancestors_found.insert(ancestor.to_string());
            }
        }
        self.paths.extend(ancestors_found);
    }
}

impl<S: Into<String>> FromIterator<S> for ChangedPaths {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().map(Into::into).collect(),
            subtrees: BTreeSet::new(),
        }
    }
}

/// Proper ancestors of a normalized path, nearest first
///
/// `/b/c.txt` yields `/b`, `/`; `C:/b/c.txt` yields `C:/b`, `C:`.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    let mut rest = Some(path);
    std::iter::from_fn(move || {
        let current = rest?;
        match current.rfind('/') {
            Some(0) if current.len() > 1 => {
                rest = None;
                Some("/")
            }
            Some(i) if i > 0 => {
                let parent = &current[..i];
                rest = Some(parent);
                Some(parent)
            }
            _ => {
                rest = None;
                None
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ancestors_unix_style() {
        let found: Vec<_> = ancestors("/b/c.txt").collect();
        assert_eq!(found, vec!["/b", "/"]);
        assert_eq!(ancestors("/").count(), 0);
        assert_eq!(ancestors("/a").collect::<Vec<_>>(), vec!["/"]);
    }

    #[test]
    fn test_ancestors_drive_style() {
        let found: Vec<_> = ancestors("C:/data/b/c.txt").collect();
        assert_eq!(found, vec!["C:/data/b", "C:/data", "C:"]);
        assert_eq!(ancestors("C:").count(), 0);
    }

    #[test]
    fn test_flesh_out_closes_under_ancestors() {
        let mut set: ChangedPaths = ["/b/c.txt"].into_iter().collect();
        set.flesh_out();

        let members: Vec<_> = set.iter().collect();
        assert_eq!(members, vec!["/", "/b", "/b/c.txt"]);
    }

    #[test]
    fn test_flesh_out_is_idempotent() {
        let mut set: ChangedPaths = ["/x/y/z", "/x/w", "/q"].into_iter().collect();
        set.flesh_out();
        let once = set.clone();
        set.flesh_out();
        assert_eq!(set, once);

        for member in set.iter() {
            for ancestor in ancestors(member) {
                assert!(set.contains(ancestor), "{} missing ancestor {}", member, ancestor);
            }
        }
    }

    #[test]
    fn test_subtree_covers_descendants() {
        let mut set = ChangedPaths::new();
        set.insert_subtree("/src/x");
        set.flesh_out();

        assert!(set.contains("/src/x"));
        assert!(set.contains("/src/x/f.txt"));
        assert!(set.contains("/src/x/deep/g.txt"));
        assert!(set.contains("/src"));
        assert!(!set.contains("/src/xy"));
        assert!(!set.contains("/src/y/f.txt"));
        assert!(!set.in_subtree("/src"));
        assert_eq!(set.subtree_count(), 1);
    }

    #[test]
    fn test_contains_path_normalizes() {
        let set: ChangedPaths = ["/src/b"].into_iter().collect();
        assert!(set.contains_path(Path::new("/src/b/")));
        assert!(!set.contains_path(Path::new("/src/a")));
    }
}
