//! Hard links and directory links into the previous snapshot

use std::fs;
use std::io;
use std::path::Path;

/// Link-creation capability used by the walker
pub trait Linker {
    /// Create `link` as a hard link to the existing file `target`
    fn hard_link(&self, link: &Path, target: &Path) -> io::Result<()>;

    /// Create `link` as a directory link that dereferences to `target`
    fn directory_link(&self, link: &Path, target: &Path) -> io::Result<()>;
}

/// Links through the host filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLinker;

impl Linker for NativeLinker {
    fn hard_link(&self, link: &Path, target: &Path) -> io::Result<()> {
        fs::hard_link(target, link)
    }

    fn directory_link(&self, link: &Path, target: &Path) -> io::Result<()> {
        make_directory_link(link, target)
    }
}

/// Create a symbolic directory link at `link` pointing to `target`
#[cfg(unix)]
pub fn make_directory_link(link: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

/// Create a symbolic directory link at `link` pointing to `target`
///
/// Creating symbolic links needs a privilege (or developer mode) that many
/// accounts lack; when it is refused, a junction is created instead.
#[cfg(windows)]
pub fn make_directory_link(link: &Path, target: &Path) -> io::Result<()> {
    const ERROR_PRIVILEGE_NOT_HELD: i32 = 1314;

    match std::os::windows::fs::symlink_dir(target, link) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(ERROR_PRIVILEGE_NOT_HELD) => {
            tracing::debug!(
                "Symbolic link refused for {}, creating junction",
                link.display()
            );
            crate::windows::junction::create(link, target)
        }
        Err(e) => Err(e),
    }
}
