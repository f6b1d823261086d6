//! Volume Descriptor Set
//!
//! Descriptors start at sector 16, one per 2048-byte sector, and the set ends with a
//! terminator (type 255). Each descriptor begins with its type byte, the standard identifier
//! `CD001`, and a version byte.

use time::OffsetDateTime;
use tracing::{debug, warn};

use super::datetime::decode_volume_datetime;
use super::record::{DirectoryRecord, both_endian_u16, both_endian_u32};
use crate::result::{FsError, FsResult};
use crate::source::ByteSource;

/// Logical sector (and block) size.
pub(crate) const SECTOR_SIZE: u64 = 2048;

/// Sectors reserved for the system area before the descriptor set.
pub(crate) const SYSTEM_AREA_SECTORS: u64 = 16;

const STANDARD_IDENTIFIER: &[u8; 5] = b"CD001";

/// Volume descriptor type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DescriptorType {
    BootRecord,
    Primary,
    Supplementary,
    Partition,
    Terminator,
    Reserved(u8),
}

impl From<u8> for DescriptorType {
    fn from(value: u8) -> Self {
        match value {
            0 => DescriptorType::BootRecord,
            1 => DescriptorType::Primary,
            2 => DescriptorType::Supplementary,
            3 => DescriptorType::Partition,
            255 => DescriptorType::Terminator,
            other => DescriptorType::Reserved(other),
        }
    }
}

/// Identification and size of the volume, from the primary volume descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    /// System that can act on the system area (sectors 0 to 15).
    pub system_identifier: String,
    /// Volume name.
    pub volume_identifier: String,
    /// Size of the volume in logical blocks.
    pub volume_space_size: u32,
    /// Logical block size in bytes; always 2048 for images this crate reads.
    pub logical_block_size: u16,
    /// When the volume was created.
    pub creation_time: Option<OffsetDateTime>,
    /// When the volume was last modified.
    pub modification_time: Option<OffsetDateTime>,
}

/// The primary volume descriptor and the root of the directory tree it anchors.
#[derive(Debug, Clone)]
pub(crate) struct PrimaryVolume {
    pub(crate) info: VolumeInfo,
    pub(crate) root: DirectoryRecord,
}

/// Walk the descriptor set until the primary volume descriptor.
///
/// Boot, supplementary (Joliet) and partition descriptors are skipped.
pub(crate) fn find_primary_volume<S: ByteSource + ?Sized>(source: &S) -> FsResult<PrimaryVolume> {
    let mut sector = SYSTEM_AREA_SECTORS;
    let mut buffer = vec![0u8; SECTOR_SIZE as usize];
    loop {
        let offset = sector * SECTOR_SIZE;
        if offset + SECTOR_SIZE > source.len() {
            return Err(FsError::NoPrimaryVolumeDescriptor { sector });
        }
        source.read_exact_at(offset, &mut buffer)?;
        if &buffer[1..6] != STANDARD_IDENTIFIER {
            return Err(FsError::InvalidImage {
                offset,
                reason: "volume descriptor lacks the CD001 standard identifier".into(),
            });
        }

        match DescriptorType::from(buffer[0]) {
            DescriptorType::Primary => {
                debug!(sector, "found primary volume descriptor");
                let volume = parse_primary(&buffer, offset)?;
                check_volume_size(&volume.info, source.len());
                return Ok(volume);
            }
            DescriptorType::Terminator => {
                return Err(FsError::NoPrimaryVolumeDescriptor { sector });
            }
            other => debug!(sector, kind = ?other, "skipping volume descriptor"),
        }
        sector += 1;
    }
}

fn identifier(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches([' ', '\0'])
        .to_owned()
}

fn parse_primary(sector: &[u8], offset: u64) -> FsResult<PrimaryVolume> {
    let invalid = |reason: &'static str| FsError::InvalidImage {
        offset,
        reason: reason.into(),
    };
    let volume_space_size = sector[80..88]
        .try_into()
        .ok()
        .and_then(both_endian_u32)
        .ok_or_else(|| invalid("volume space size halves disagree"))?;
    let logical_block_size = sector[128..132]
        .try_into()
        .ok()
        .and_then(both_endian_u16)
        .ok_or_else(|| invalid("logical block size halves disagree"))?;
    if u64::from(logical_block_size) != SECTOR_SIZE {
        return Err(FsError::InvalidImage {
            offset,
            reason: format!("unsupported logical block size {logical_block_size}").into(),
        });
    }

    let root = DirectoryRecord::parse(&sector[156..190]).map_err(|reason| FsError::InvalidImage {
        offset: offset + 156,
        reason: format!("root directory record: {reason}").into(),
    })?;
    if !root.is_dir() {
        return Err(invalid("root directory record is not a directory"));
    }

    let datetime = |at: usize| {
        sector[at..at + 17]
            .try_into()
            .ok()
            .and_then(decode_volume_datetime)
    };
    let info = VolumeInfo {
        system_identifier: identifier(&sector[8..40]),
        volume_identifier: identifier(&sector[40..72]),
        volume_space_size,
        logical_block_size,
        creation_time: datetime(813),
        modification_time: datetime(830),
    };
    debug!(
        volume = %info.volume_identifier,
        blocks = volume_space_size,
        root_extent = root.extent,
        "read primary volume descriptor"
    );
    Ok(PrimaryVolume { info, root })
}

/// The recorded volume size should cover the whole source; a mismatch only gets a warning.
fn check_volume_size(info: &VolumeInfo, source_len: u64) {
    let volume_len = u64::from(info.volume_space_size) * u64::from(info.logical_block_size);
    if volume_len < source_len {
        warn!(
            volume_len,
            source_len, "image holds data beyond the recorded volume size"
        );
    } else if volume_len > source_len {
        warn!(
            volume_len,
            source_len, "image is shorter than the recorded volume size"
        );
    }
}
