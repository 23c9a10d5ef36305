//! Versioned binary encoding for persisted state blobs
//!
//! Format:
//! - magic: "LBK\0" (4 bytes)
//! - version: u8
//! - kind: u8 (1=previous, 2=journal)
//! - payload: bincode-encoded value

use crate::error::CodecError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Magic bytes at the start of every state blob
pub const MAGIC: [u8; 4] = *b"LBK\0";

/// Current format version
pub const FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = MAGIC.len() + 2;

/// Which state file a blob belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlobKind {
    /// Name of the last committed snapshot
    Previous = 1,
    /// Journal cursor and FRN map
    Journal = 2,
}

/// Encode a value with the magic header, version and kind
pub fn encode<T: Serialize>(kind: BlobKind, value: &T) -> Result<Vec<u8>, CodecError> {
    let payload = bincode::serialize(value)?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&MAGIC);
    out.push(FORMAT_VERSION);
    out.push(kind as u8);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode a blob, rejecting foreign, future-version or wrong-kind data
pub fn decode<T: DeserializeOwned>(kind: BlobKind, bytes: &[u8]) -> Result<T, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Truncated(bytes.len()));
    }
    if bytes[..MAGIC.len()] != MAGIC {
        return Err(CodecError::BadMagic);
    }

    let version = bytes[MAGIC.len()];
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion {
            found: version,
            expected: FORMAT_VERSION,
        });
    }

    let found = bytes[MAGIC.len() + 1];
    if found != kind as u8 {
        return Err(CodecError::WrongKind {
            found,
            expected: kind as u8,
        });
    }

    Ok(bincode::deserialize(&bytes[HEADER_LEN..])?)
}
