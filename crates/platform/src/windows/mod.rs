//! NTFS change journal adapter
//!
//! Opens `\\.\X:` and drives the USN journal through `DeviceIoControl`.

pub mod junction;

use crate::decode::{self, BATCH_HEADER_LEN};
use journal::{ChangeRecord, JournalError, JournalInfo, RecordIter, Usn, Volume, VolumeProvider};
use std::collections::VecDeque;
use std::io;
use std::mem;
use std::path::{Component, Path, Prefix};
use std::ptr::null_mut;
use winapi::ctypes::c_void;
use winapi::shared::minwindef::{DWORD, FALSE};
use winapi::shared::winerror::{
    ERROR_HANDLE_EOF, ERROR_JOURNAL_DELETE_IN_PROGRESS, ERROR_JOURNAL_NOT_ACTIVE,
};
use winapi::um::fileapi::{CreateFileW, OPEN_EXISTING};
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::ioapiset::DeviceIoControl;
use winapi::um::winnt::{FILE_SHARE_READ, FILE_SHARE_WRITE, GENERIC_READ, GENERIC_WRITE, HANDLE};

const FSCTL_ENUM_USN_DATA: DWORD = 0x0009_00b3;
const FSCTL_READ_USN_JOURNAL: DWORD = 0x0009_00bb;
const FSCTL_CREATE_USN_JOURNAL: DWORD = 0x0009_00e7;
const FSCTL_QUERY_USN_JOURNAL: DWORD = 0x0009_00f4;

/// Size of the ioctl output buffer
const BUFFER_SIZE: usize = 64 * 1024;

const DEFAULT_JOURNAL_MAX_SIZE: u64 = 32 * 1024 * 1024;
const DEFAULT_JOURNAL_ALLOCATION_DELTA: u64 = 8 * 1024 * 1024;

/// USN_JOURNAL_DATA_V0
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct UsnJournalData {
    usn_journal_id: u64,
    first_usn: i64,
    next_usn: i64,
    lowest_valid_usn: i64,
    max_usn: i64,
    maximum_size: u64,
    allocation_delta: u64,
}

/// CREATE_USN_JOURNAL_DATA
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct CreateUsnJournalData {
    maximum_size: u64,
    allocation_delta: u64,
}

/// READ_USN_JOURNAL_DATA_V0
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct ReadUsnJournalData {
    start_usn: i64,
    reason_mask: u32,
    return_only_on_close: u32,
    timeout: u64,
    bytes_to_wait_for: u64,
    usn_journal_id: u64,
}

/// MFT_ENUM_DATA_V0
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct MftEnumData {
    start_file_reference_number: u64,
    low_usn: i64,
    high_usn: i64,
}

/// Opens the NTFS volume of a drive letter
#[derive(Debug, Clone)]
pub struct UsnVolumeProvider {
    drive: char,
    mount: String,
}

impl UsnVolumeProvider {
    pub fn new(drive: char) -> Self {
        let drive = drive.to_ascii_uppercase();
        Self {
            drive,
            mount: format!("{}:", drive),
        }
    }

    /// Provider for the drive a path lives on; `None` for UNC paths
    pub fn for_path(path: &Path) -> Option<Self> {
        match path.components().next()? {
            Component::Prefix(prefix) => match prefix.kind() {
                Prefix::Disk(letter) | Prefix::VerbatimDisk(letter) => {
                    Some(Self::new(letter as char))
                }
                _ => None,
            },
            _ => None,
        }
    }
}

impl VolumeProvider for UsnVolumeProvider {
    fn mount_point(&self) -> &str {
        &self.mount
    }

    fn open(&self) -> Result<Box<dyn Volume + '_>, JournalError> {
        let device = format!("\\\\.\\{}:", self.drive);
        let wide: Vec<u16> = device.encode_utf16().chain(std::iter::once(0)).collect();

        let handle = unsafe {
            CreateFileW(
                wide.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                null_mut(),
                OPEN_EXISTING,
                0,
                null_mut(),
            )
        };

        if handle == INVALID_HANDLE_VALUE {
            return Err(JournalError::Unavailable(format!(
                "cannot open volume {}: {}",
                device,
                io::Error::last_os_error()
            )));
        }

        Ok(Box::new(UsnVolume {
            handle: OwnedHandle(handle),
            buffer: vec![0u8; BUFFER_SIZE],
            queried: None,
        }))
    }
}

pub(crate) struct OwnedHandle(pub(crate) HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        unsafe { CloseHandle(self.0) };
    }
}

/// An open volume handle
pub struct UsnVolume {
    handle: OwnedHandle,
    buffer: Vec<u8>,
    /// Journal id and next USN seen by the latest query
    queried: Option<(u64, Usn)>,
}

impl UsnVolume {
    /// Run an ioctl; returns the number of output bytes written
    fn ioctl<T>(&mut self, code: DWORD, input: Option<&T>, output_to_buffer: bool) -> io::Result<usize> {
        let (in_ptr, in_len) = match input {
            Some(value) => (value as *const T as *mut c_void, mem::size_of::<T>() as DWORD),
            None => (null_mut(), 0),
        };
        let (out_ptr, out_len) = if output_to_buffer {
            (self.buffer.as_mut_ptr() as *mut c_void, self.buffer.len() as DWORD)
        } else {
            (null_mut(), 0)
        };

        let mut bytes_returned: DWORD = 0;
        let ok = unsafe {
            DeviceIoControl(
                self.handle.0,
                code,
                in_ptr,
                in_len,
                out_ptr,
                out_len,
                &mut bytes_returned,
                null_mut(),
            )
        };

        if ok == FALSE {
            Err(io::Error::last_os_error())
        } else {
            Ok(bytes_returned as usize)
        }
    }
}

impl Volume for UsnVolume {
    fn query(&mut self) -> Result<JournalInfo, JournalError> {
        let mut data = UsnJournalData::default();
        let mut bytes_returned: DWORD = 0;

        let ok = unsafe {
            DeviceIoControl(
                self.handle.0,
                FSCTL_QUERY_USN_JOURNAL,
                null_mut(),
                0,
                &mut data as *mut UsnJournalData as *mut c_void,
                mem::size_of::<UsnJournalData>() as DWORD,
                &mut bytes_returned,
                null_mut(),
            )
        };

        if ok == FALSE {
            let err = io::Error::last_os_error();
            return match err.raw_os_error().map(|c| c as u32) {
                Some(ERROR_JOURNAL_NOT_ACTIVE) | Some(ERROR_JOURNAL_DELETE_IN_PROGRESS) => {
                    Err(JournalError::NotFound)
                }
                _ => Err(JournalError::Io(err)),
            };
        }

        let info = JournalInfo {
            journal_id: data.usn_journal_id,
            first_usn: data.first_usn.max(0) as Usn,
            next_usn: data.next_usn.max(0) as Usn,
        };
        self.queried = Some((info.journal_id, info.next_usn));
        Ok(info)
    }

    fn create(&mut self) -> Result<(), JournalError> {
        let request = CreateUsnJournalData {
            maximum_size: DEFAULT_JOURNAL_MAX_SIZE,
            allocation_delta: DEFAULT_JOURNAL_ALLOCATION_DELTA,
        };
        self.ioctl(FSCTL_CREATE_USN_JOURNAL, Some(&request), false)?;
        Ok(())
    }

    fn enumerate(&mut self, high_usn: Usn) -> Result<RecordIter<'_>, JournalError> {
        Ok(Box::new(Feed {
            volume: self,
            kind: FeedKind::Enumerate { high_usn },
            cursor: 0,
            pending: VecDeque::new(),
            done: false,
        }))
    }

    fn read_from(&mut self, journal_id: u64, start_usn: Usn) -> Result<RecordIter<'_>, JournalError> {
        // Records written after the query belong to the next run
        let stop_usn = self
            .queried
            .filter(|(queried_id, _)| *queried_id == journal_id)
            .map(|(_, next_usn)| next_usn);
        let kind = FeedKind::Read {
            journal_id,
            stop_usn,
        };
        Ok(Box::new(Feed {
            volume: self,
            kind,
            cursor: start_usn,
            pending: VecDeque::new(),
            done: kind.exhausted_at(start_usn),
        }))
    }
}

#[derive(Debug, Clone, Copy)]
enum FeedKind {
    /// FSCTL_ENUM_USN_DATA; the cursor is the next start FRN
    Enumerate { high_usn: Usn },
    /// FSCTL_READ_USN_JOURNAL; the cursor is the next start USN. Reading
    /// stops once it reaches `stop_usn`, the next USN at query time.
    Read {
        journal_id: u64,
        stop_usn: Option<Usn>,
    },
}

impl FeedKind {
    /// Whether a cursor at `usn` has covered everything the feed reads
    fn exhausted_at(&self, usn: u64) -> bool {
        matches!(self, FeedKind::Read { stop_usn: Some(stop), .. } if usn >= *stop)
    }
}

/// Lazily fetches batches and yields their records
struct Feed<'a> {
    volume: &'a mut UsnVolume,
    kind: FeedKind,
    cursor: u64,
    pending: VecDeque<Result<ChangeRecord, JournalError>>,
    done: bool,
}

impl Feed<'_> {
    fn fetch(&mut self) -> Result<(), JournalError> {
        let result = match self.kind {
            FeedKind::Enumerate { high_usn } => {
                let request = MftEnumData {
                    start_file_reference_number: self.cursor,
                    low_usn: 0,
                    high_usn: high_usn as i64,
                };
                self.volume.ioctl(FSCTL_ENUM_USN_DATA, Some(&request), true)
            }
            FeedKind::Read { journal_id, .. } => {
                let request = ReadUsnJournalData {
                    start_usn: self.cursor as i64,
                    reason_mask: u32::MAX,
                    return_only_on_close: 0,
                    timeout: 0,
                    bytes_to_wait_for: 0,
                    usn_journal_id: journal_id,
                };
                self.volume.ioctl(FSCTL_READ_USN_JOURNAL, Some(&request), true)
            }
        };

        let len = match result {
            Ok(len) => len,
            Err(e) if e.raw_os_error() == Some(ERROR_HANDLE_EOF as i32) => {
                self.done = true;
                return Ok(());
            }
            Err(e) => return Err(JournalError::Io(e)),
        };

        let batch = decode::parse_batch(&self.volume.buffer[..len])?;

        // End of data is a cursor that did not move. A batch whose records
        // were all skipped by the decoder still moves it.
        if batch.next <= self.cursor && len <= BATCH_HEADER_LEN {
            self.done = true;
            return Ok(());
        }
        if batch.next <= self.cursor {
            self.done = true;
        }
        if self.kind.exhausted_at(batch.next) {
            self.done = true;
        }
        self.cursor = batch.next;
        self.pending.extend(batch.records);
        Ok(())
    }
}

impl Iterator for Feed<'_> {
    type Item = Result<ChangeRecord, JournalError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(record);
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}
