//! Lock file guarding a target directory against concurrent runs
//!
//! `<target>/.lock` names the process holding the target and what it is
//! doing there. On unix the file is also `flock`ed, so a crashed holder
//! releases it with its descriptors and only the stale record is left. On
//! other platforms the record alone decides: a holder that is no longer
//! running is reclaimed.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use lb_core::store::TargetLayout;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Exclusive lock on a target directory, released on drop
#[derive(Debug)]
pub struct TargetLock {
    path: PathBuf,
    #[allow(dead_code)]
    file: File,
}

/// Who holds a target and since when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    pub pid: u32,
    /// Subcommand that took the lock
    pub command: String,
    pub started_at: DateTime<Utc>,
}

impl LockHolder {
    fn current(command: &str) -> Self {
        Self {
            pid: std::process::id(),
            command: command.to_string(),
            started_at: Utc::now(),
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "pid {} ({}) since {}",
            self.pid,
            self.command,
            self.started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        )
    }
}

impl TargetLock {
    /// Lock `target` for `command`
    ///
    /// Fails naming the holder when a running process has the target.
    pub fn acquire(target: &Path, command: &str) -> Result<Self> {
        let path = TargetLayout::new(target).lock_file();

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;

        let previous = read_holder(&mut file);
        if !try_lock_exclusive(&file, previous.as_ref())? {
            match previous {
                Some(holder) => bail!(
                    "Target {} is locked by {}",
                    target.display(),
                    holder.describe()
                ),
                None => bail!(
                    "Target {} is locked by another linkback process",
                    target.display()
                ),
            }
        }

        if let Some(holder) = previous {
            warn!(
                "Reclaiming lock on {} left by {}",
                target.display(),
                holder.describe()
            );
        }

        write_holder(&mut file, &LockHolder::current(command))
            .with_context(|| format!("Failed to write lock file {}", path.display()))?;
        debug!("Locked {} for {}", target.display(), command);

        Ok(Self { path, file })
    }

    /// Holder recorded in the lock file of `target`, if any
    pub fn holder(target: &Path) -> Option<LockHolder> {
        let mut file = File::open(TargetLayout::new(target).lock_file()).ok()?;
        read_holder(&mut file)
    }
}

impl Drop for TargetLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Unreadable or empty records count as no holder
fn read_holder(file: &mut File) -> Option<LockHolder> {
    file.seek(SeekFrom::Start(0)).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    serde_json::from_str(&contents).ok()
}

fn write_holder(file: &mut File, holder: &LockHolder) -> Result<()> {
    let serialized = serde_json::to_string(holder).context("Failed to serialize lock holder")?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(serialized.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

/// Non-blocking exclusive `flock`; the recorded holder is not consulted
#[cfg(unix)]
fn try_lock_exclusive(file: &File, _holder: Option<&LockHolder>) -> Result<bool> {
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::EWOULDBLOCK) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Free unless the recorded holder is still running
#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File, holder: Option<&LockHolder>) -> Result<bool> {
    Ok(holder.map_or(true, |holder| !is_process_alive(holder.pid)))
}

#[cfg(target_os = "linux")]
fn is_process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // Null signal: existence check only
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        Err(_) => true,
    }
}

#[cfg(windows)]
fn is_process_alive(pid: u32) -> bool {
    use winapi::shared::minwindef::{DWORD, FALSE};
    use winapi::shared::winerror::ERROR_ACCESS_DENIED;
    use winapi::um::errhandlingapi::GetLastError;
    use winapi::um::handleapi::CloseHandle;
    use winapi::um::minwinbase::STILL_ACTIVE;
    use winapi::um::processthreadsapi::{GetExitCodeProcess, OpenProcess};
    use winapi::um::winnt::PROCESS_QUERY_LIMITED_INFORMATION;

    // SAFETY: the handle is checked before use and closed exactly once
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, FALSE, pid);
        if handle.is_null() {
            // Processes of other users refuse the query but exist
            return GetLastError() == ERROR_ACCESS_DENIED;
        }
        let mut code: DWORD = 0;
        let queried = GetExitCodeProcess(handle, &mut code);
        CloseHandle(handle);
        queried != 0 && code == STILL_ACTIVE
    }
}

#[cfg(not(any(unix, windows)))]
fn is_process_alive(_pid: u32) -> bool {
    true
}
