//! NTFS junctions (mount-point reparse points)
//!
//! Junctions dereference like directory symlinks but need no privilege to
//! create. They only point at absolute local paths.

use super::OwnedHandle;
use std::fs;
use std::io;
use std::mem;
use std::path::Path;
use std::ptr::null_mut;
use winapi::ctypes::c_void;
use winapi::shared::minwindef::{DWORD, FALSE};
use winapi::um::fileapi::{CreateFileW, OPEN_EXISTING};
use winapi::um::handleapi::INVALID_HANDLE_VALUE;
use winapi::um::ioapiset::DeviceIoControl;
use winapi::um::winbase::{FILE_FLAG_BACKUP_SEMANTICS, FILE_FLAG_OPEN_REPARSE_POINT};
use winapi::um::winnt::GENERIC_WRITE;

const FSCTL_SET_REPARSE_POINT: DWORD = 0x0009_00a4;
const IO_REPARSE_TAG_MOUNT_POINT: u32 = 0xA000_0003;

/// Reparse tag, data length, reserved
const REPARSE_HEADER_LEN: usize = 8;
/// Substitute and print name offsets and lengths
const MOUNT_POINT_HEADER_LEN: usize = 8;

const NT_PREFIX: &str = "\\??\\";
const VERBATIM_PREFIX: &str = "\\\\?\\";

/// Create a junction at `link` (which must not exist) pointing to `target`
pub fn create(link: &Path, target: &Path) -> io::Result<()> {
    let target = fs::canonicalize(target)?;
    let target = target.to_string_lossy();
    let print_name = target.strip_prefix(VERBATIM_PREFIX).unwrap_or(&target);
    let substitute_name = format!("{}{}", NT_PREFIX, print_name);

    fs::create_dir(link)?;
    if let Err(e) = set_mount_point(link, &substitute_name, print_name) {
        let _ = fs::remove_dir(link);
        return Err(e);
    }
    Ok(())
}

fn set_mount_point(link: &Path, substitute_name: &str, print_name: &str) -> io::Result<()> {
    let buffer = reparse_buffer(substitute_name, print_name)?;

    let wide: Vec<u16> = link
        .as_os_str()
        .to_string_lossy()
        .encode_utf16()
        .chain(std::iter::once(0))
        .collect();
    let handle = unsafe {
        CreateFileW(
            wide.as_ptr(),
            GENERIC_WRITE,
            0,
            null_mut(),
            OPEN_EXISTING,
            FILE_FLAG_OPEN_REPARSE_POINT | FILE_FLAG_BACKUP_SEMANTICS,
            null_mut(),
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        return Err(io::Error::last_os_error());
    }
    let handle = OwnedHandle(handle);

    let mut bytes_returned: DWORD = 0;
    let ok = unsafe {
        DeviceIoControl(
            handle.0,
            FSCTL_SET_REPARSE_POINT,
            buffer.as_ptr() as *mut c_void,
            buffer.len() as DWORD,
            null_mut(),
            0,
            &mut bytes_returned,
            null_mut(),
        )
    };
    if ok == FALSE {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Lay out a REPARSE_DATA_BUFFER with a MountPointReparseBuffer
///
/// Both names are NUL terminated in the path buffer; the lengths exclude
/// the terminators.
fn reparse_buffer(substitute_name: &str, print_name: &str) -> io::Result<Vec<u8>> {
    let substitute: Vec<u16> = substitute_name.encode_utf16().collect();
    let print: Vec<u16> = print_name.encode_utf16().collect();

    let unit = mem::size_of::<u16>();
    let substitute_len = substitute.len() * unit;
    let print_len = print.len() * unit;
    let path_buffer_len = substitute_len + unit + print_len + unit;
    let data_len = MOUNT_POINT_HEADER_LEN + path_buffer_len;

    if data_len > u16::MAX as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "junction target path is too long",
        ));
    }

    let mut buf = Vec::with_capacity(REPARSE_HEADER_LEN + data_len);
    buf.extend_from_slice(&IO_REPARSE_TAG_MOUNT_POINT.to_le_bytes());
    buf.extend_from_slice(&(data_len as u16).to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());

    buf.extend_from_slice(&0u16.to_le_bytes());
    buf.extend_from_slice(&(substitute_len as u16).to_le_bytes());
    buf.extend_from_slice(&((substitute_len + unit) as u16).to_le_bytes());
    buf.extend_from_slice(&(print_len as u16).to_le_bytes());

    for unit in substitute.iter().chain(std::iter::once(&0)) {
        buf.extend_from_slice(&unit.to_le_bytes());
    }
    for unit in print.iter().chain(std::iter::once(&0)) {
        buf.extend_from_slice(&unit.to_le_bytes());
    }

    Ok(buf)
}
