//! Decoding of raw USN journal buffers
//!
//! Buffers returned by `FSCTL_READ_USN_JOURNAL` and `FSCTL_ENUM_USN_DATA`
//! start with an 8-byte cursor (next USN, or next FRN for enumeration),
//! followed by 8-byte aligned `USN_RECORD_V2` / `USN_RECORD_V3` records.

use journal::{ChangeRecord, JournalError};

/// Size of the cursor that precedes the records in a batch
pub const BATCH_HEADER_LEN: usize = 8;

const V2_MIN_LEN: usize = 60;
const V3_MIN_LEN: usize = 76;

/// One decoded batch
#[derive(Debug)]
pub struct Batch {
    /// Cursor for the next request
    pub next: u64,
    /// Records in order; undecodable names are per-record errors
    pub records: Vec<Result<ChangeRecord, JournalError>>,
}

/// Decode the first `len` bytes of an ioctl output buffer
pub fn parse_batch(buffer: &[u8]) -> Result<Batch, JournalError> {
    if buffer.len() < BATCH_HEADER_LEN {
        return Err(JournalError::Parse(format!(
            "batch of {} bytes has no cursor",
            buffer.len()
        )));
    }

    let next = le_u64(buffer, 0)?;
    let mut records = Vec::new();
    let mut offset = BATCH_HEADER_LEN;

    while offset + 4 <= buffer.len() {
        let record_len = le_u32(buffer, offset)? as usize;
        if record_len == 0 {
            break;
        }
        if offset + record_len > buffer.len() {
            return Err(JournalError::Parse(format!(
                "record at offset {} claims {} bytes, buffer has {}",
                offset,
                record_len,
                buffer.len() - offset
            )));
        }

        match parse_record(&buffer[offset..offset + record_len]) {
            Ok(Some(record)) => records.push(Ok(record)),
            Ok(None) => {}
            Err(e) if e.is_record_local() => records.push(Err(e)),
            Err(e) => return Err(e),
        }
        offset += record_len;
    }

    Ok(Batch { next, records })
}

/// Decode a single record
///
/// Returns `Ok(None)` for record versions this decoder does not know
/// (V4 range-tracking records carry no name).
pub fn parse_record(bytes: &[u8]) -> Result<Option<ChangeRecord>, JournalError> {
    let major = le_u16(bytes, 4)?;
    match major {
        2 => parse_v2(bytes).map(Some),
        3 => parse_v3(bytes).map(Some),
        _ => Ok(None),
    }
}

fn parse_v2(bytes: &[u8]) -> Result<ChangeRecord, JournalError> {
    if bytes.len() < V2_MIN_LEN {
        return Err(JournalError::Parse(format!("V2 record of {} bytes", bytes.len())));
    }

    let frn = le_u64(bytes, 8)?;
    let parent_frn = le_u64(bytes, 16)?;
    let usn = usn_from_raw(le_u64(bytes, 24)?);
    let reason = le_u32(bytes, 40)?;
    let attributes = le_u32(bytes, 52)?;
    let name_len = le_u16(bytes, 56)? as usize;
    let name_offset = le_u16(bytes, 58)? as usize;
    let name = decode_name(bytes, name_offset, name_len, frn, parent_frn, usn)?;

    Ok(ChangeRecord {
        usn,
        frn,
        parent_frn,
        name,
        attributes,
        reason,
    })
}

/// V3 identifiers are 128-bit; NTFS only fills the low 64 bits
fn parse_v3(bytes: &[u8]) -> Result<ChangeRecord, JournalError> {
    if bytes.len() < V3_MIN_LEN {
        return Err(JournalError::Parse(format!("V3 record of {} bytes", bytes.len())));
    }

    let frn = le_u64(bytes, 8)?;
    let parent_frn = le_u64(bytes, 24)?;
    let usn = usn_from_raw(le_u64(bytes, 40)?);
    let reason = le_u32(bytes, 56)?;
    let attributes = le_u32(bytes, 68)?;
    let name_len = le_u16(bytes, 72)? as usize;
    let name_offset = le_u16(bytes, 74)? as usize;
    let name = decode_name(bytes, name_offset, name_len, frn, parent_frn, usn)?;

    Ok(ChangeRecord {
        usn,
        frn,
        parent_frn,
        name,
        attributes,
        reason,
    })
}

/// USNs are signed on the wire; negative values never occur in practice
fn usn_from_raw(raw: u64) -> u64 {
    (raw as i64).max(0) as u64
}

fn decode_name(
    bytes: &[u8],
    offset: usize,
    len: usize,
    frn: u64,
    parent_frn: u64,
    usn: u64,
) -> Result<String, JournalError> {
    let end = offset + len;
    if end > bytes.len() || len % 2 != 0 {
        return Err(JournalError::Parse(format!(
            "name at {}..{} outside record of {} bytes",
            offset,
            end,
            bytes.len()
        )));
    }

    let units: Vec<u16> = bytes[offset..end]
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| JournalError::Encoding {
        frn,
        parent_frn,
        usn,
    })
}

fn le_u16(bytes: &[u8], offset: usize) -> Result<u16, JournalError> {
    bytes
        .get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| JournalError::Parse(format!("truncated at offset {}", offset)))
}

fn le_u32(bytes: &[u8], offset: usize) -> Result<u32, JournalError> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| JournalError::Parse(format!("truncated at offset {}", offset)))
}

fn le_u64(bytes: &[u8], offset: usize) -> Result<u64, JournalError> {
    let mut raw = [0u8; 8];
    let slice = bytes
        .get(offset..offset + 8)
        .ok_or_else(|| JournalError::Parse(format!("truncated at offset {}", offset)))?;
    raw.copy_from_slice(slice);
    Ok(u64::from_le_bytes(raw))
}
