//! Directory Record structure
//!
//! Directory records describe files and subdirectories. Each one is variable length:
//!
//! | Offset | Size | Field                                   |
//! | ------ | ---- | --------------------------------------- |
//! | 0      | 1    | Length of directory record              |
//! | 1      | 1    | Extended attribute record length        |
//! | 2      | 8    | Extent location (both-endian)           |
//! | 10     | 8    | Data length (both-endian)               |
//! | 18     | 7    | Recording date and time                 |
//! | 25     | 1    | File flags                              |
//! | 26     | 1    | File unit size (interleaved files)      |
//! | 27     | 1    | Interleave gap size                     |
//! | 28     | 4    | Volume sequence number (both-endian)    |
//! | 32     | 1    | Length of file identifier               |
//! | 33     | n    | File identifier, padding, system use    |

use std::borrow::Cow;

use time::OffsetDateTime;

use super::datetime::decode_record_datetime;
use crate::cp437::FromCp437;
use crate::path::strip_iso_version;

const FLAG_DIRECTORY: u8 = 0x02;
const FLAG_ASSOCIATED: u8 = 0x04;
const FLAG_NOT_FINAL: u8 = 0x80;

/// Fixed part of a record plus a one-byte identifier.
pub(crate) const MIN_RECORD_LENGTH: usize = 34;

/// Read a both-endian 32-bit field; `None` if the two halves disagree.
pub(crate) fn both_endian_u32(bytes: &[u8; 8]) -> Option<u32> {
    let le = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let be = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    (le == be).then_some(le)
}

/// Read a both-endian 16-bit field; `None` if the two halves disagree.
pub(crate) fn both_endian_u16(bytes: &[u8; 4]) -> Option<u16> {
    let le = u16::from_le_bytes([bytes[0], bytes[1]]);
    let be = u16::from_be_bytes([bytes[2], bytes[3]]);
    (le == be).then_some(le)
}

/// Callers have checked `bytes` against [`MIN_RECORD_LENGTH`].
fn field<const N: usize>(bytes: &[u8], at: usize) -> [u8; N] {
    let mut out = [0; N];
    out.copy_from_slice(&bytes[at..at + N]);
    out
}

/// A decoded directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DirectoryRecord {
    pub(crate) length: u8,
    pub(crate) extended_attribute_length: u8,
    /// First logical block of the extent.
    pub(crate) extent: u32,
    pub(crate) data_length: u32,
    pub(crate) recorded: Option<OffsetDateTime>,
    pub(crate) flags: u8,
    pub(crate) identifier: Box<[u8]>,
}

impl DirectoryRecord {
    /// Decode the record at the front of `bytes`, which must span at least the length the
    /// record announces.
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self, Cow<'static, str>> {
        let length = *bytes.first().ok_or("empty record")?;
        if (length as usize) < MIN_RECORD_LENGTH {
            return Err(format!("record length {length} is shorter than its fixed fields").into());
        }
        if length as usize > bytes.len() {
            return Err(format!(
                "record length {length} overruns the {} bytes available",
                bytes.len()
            )
            .into());
        }

        let extent = both_endian_u32(&field(bytes, 2)).ok_or("extent location halves disagree")?;
        let data_length = both_endian_u32(&field(bytes, 10)).ok_or("data length halves disagree")?;
        let identifier_length = bytes[32] as usize;
        if 33 + identifier_length > length as usize {
            return Err(format!(
                "identifier of {identifier_length} bytes overruns the record of {length} bytes"
            )
            .into());
        }

        Ok(Self {
            length,
            extended_attribute_length: bytes[1],
            extent,
            data_length,
            recorded: decode_record_datetime(&field(bytes, 18)),
            flags: bytes[25],
            identifier: bytes[33..33 + identifier_length].into(),
        })
    }

    pub(crate) fn is_dir(&self) -> bool {
        self.flags & FLAG_DIRECTORY != 0
    }

    pub(crate) fn is_associated(&self) -> bool {
        self.flags & FLAG_ASSOCIATED != 0
    }

    /// Whether more extents of the same file follow this one.
    pub(crate) fn is_multi_extent(&self) -> bool {
        self.flags & FLAG_NOT_FINAL != 0
    }

    /// The `\0` (self) and `\1` (parent) entries at the head of every directory.
    pub(crate) fn is_self_or_parent(&self) -> bool {
        matches!(&*self.identifier, [0] | [1])
    }

    /// Byte offset of the data, past any extended attribute record.
    pub(crate) fn data_start(&self, block_size: u64) -> u64 {
        (u64::from(self.extent) + u64::from(self.extended_attribute_length)) * block_size
    }

    /// The entry name: the identifier as-is for directories, without its `;version` for
    /// files. Identifiers that are not UTF-8 are decoded as code page 437, which maps every
    /// byte to its own character.
    pub(crate) fn name(&self) -> String {
        let identifier = match std::str::from_utf8(&self.identifier) {
            Ok(identifier) => Cow::Borrowed(identifier),
            Err(_) => (&*self.identifier).from_cp437(),
        };
        if self.is_dir() {
            identifier.into_owned()
        } else {
            strip_iso_version(&identifier).to_owned()
        }
    }
}
