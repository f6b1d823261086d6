#![allow(clippy::wrong_self_convention)]
#![macro_use]

//! Fixed-size ZIP records and the search for the end of central directory.

use std::io;
use std::mem;

use tracing::{debug, trace, warn};

use crate::read::magic_finder::MagicFinder;
use crate::result::{FsError, FsResult, malformed_central};
use crate::source::{ByteSource, in_bounds};

pub type Magic = u32;

pub const LOCAL_FILE_HEADER_SIGNATURE: Magic = 0x04034b50;
pub const CENTRAL_DIRECTORY_HEADER_SIGNATURE: Magic = 0x02014b50;
pub const CENTRAL_DIRECTORY_END_SIGNATURE: Magic = 0x06054b50;
pub const ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE: Magic = 0x06064b50;
pub const ZIP64_CENTRAL_DIRECTORY_END_LOCATOR_SIGNATURE: Magic = 0x07064b50;
pub const DATA_DESCRIPTOR_SIGNATURE: Magic = 0x08074b50;

pub const ZIP64_BYTES_THR: u64 = u32::MAX as u64;

/// Longest comment an end of central directory record can announce.
pub const MAX_COMMENT_LENGTH: u64 = u16::MAX as u64;

pub(crate) trait Block: Sized + Copy {
    const MAGIC: Magic;

    fn from_le(self) -> Self;

    fn magic(self) -> Magic;

    fn deserialize(block: &[u8]) -> Self {
        assert_eq!(block.len(), mem::size_of::<Self>());
        let block_ptr: *const Self = block.as_ptr().cast();
        unsafe { block_ptr.read_unaligned() }
    }

    /// Decode a block from the front of `bytes`; `None` if there are too few bytes or the
    /// signature does not match.
    fn interpret(bytes: &[u8]) -> Option<Self> {
        let bytes = bytes.get(..size_of::<Self>())?;
        let block = Self::deserialize(bytes).from_le();
        (block.magic() == Self::MAGIC).then_some(block)
    }

    /// Read and decode a block at `offset`; `Ok(None)` on a signature mismatch.
    fn read_at<S: ByteSource + ?Sized>(source: &S, offset: u64) -> io::Result<Option<Self>> {
        let bytes = source.read_vec_at(offset, size_of::<Self>())?;
        Ok(Self::interpret(&bytes))
    }
}

/// Convert all the fields of a struct *from* little-endian representations.
macro_rules! from_le {
    ($obj:ident, $field:ident, $type:ty) => {
        $obj.$field = <$type>::from_le($obj.$field);
    };
    ($obj:ident, [($field:ident, $type:ty) $(,)?]) => {
        from_le![$obj, $field, $type];
    };
    ($obj:ident, [($field:ident, $type:ty), $($rest:tt),+ $(,)?]) => {
        from_le![$obj, $field, $type];
        from_le!($obj, [$($rest),+]);
    };
}

#[derive(Copy, Clone, Debug)]
#[repr(packed)]
pub(crate) struct Zip32CDEBlock {
    pub magic: Magic,
    pub disk_number: u16,
    pub disk_with_central_directory: u16,
    pub number_of_files_on_this_disk: u16,
    pub number_of_files: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub zip_file_comment_length: u16,
}

impl Block for Zip32CDEBlock {
    const MAGIC: Magic = CENTRAL_DIRECTORY_END_SIGNATURE;

    #[inline(always)]
    fn from_le(mut self) -> Self {
        from_le![
            self,
            [
                (magic, Magic),
                (disk_number, u16),
                (disk_with_central_directory, u16),
                (number_of_files_on_this_disk, u16),
                (number_of_files, u16),
                (central_directory_size, u32),
                (central_directory_offset, u32),
                (zip_file_comment_length, u16)
            ]
        ];
        self
    }

    fn magic(self) -> Magic {
        self.magic
    }
}

#[derive(Copy, Clone, Debug)]
#[repr(packed)]
pub(crate) struct Zip64CDELocatorBlock {
    pub magic: Magic,
    pub disk_with_central_directory: u32,
    pub end_of_central_directory_offset: u64,
    pub number_of_disks: u32,
}

impl Block for Zip64CDELocatorBlock {
    const MAGIC: Magic = ZIP64_CENTRAL_DIRECTORY_END_LOCATOR_SIGNATURE;

    #[inline(always)]
    fn from_le(mut self) -> Self {
        from_le![
            self,
            [
                (magic, Magic),
                (disk_with_central_directory, u32),
                (end_of_central_directory_offset, u64),
                (number_of_disks, u32),
            ]
        ];
        self
    }

    fn magic(self) -> Magic {
        self.magic
    }
}

#[derive(Copy, Clone, Debug)]
#[repr(packed)]
pub(crate) struct Zip64CDEBlock {
    pub magic: Magic,
    pub record_size: u64,
    pub version_made_by: u16,
    pub version_needed_to_extract: u16,
    pub disk_number: u32,
    pub disk_with_central_directory: u32,
    pub number_of_files_on_this_disk: u64,
    pub number_of_files: u64,
    pub central_directory_size: u64,
    pub central_directory_offset: u64,
}

impl Block for Zip64CDEBlock {
    const MAGIC: Magic = ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE;

    #[inline(always)]
    fn from_le(mut self) -> Self {
        from_le![
            self,
            [
                (magic, Magic),
                (record_size, u64),
                (version_made_by, u16),
                (version_needed_to_extract, u16),
                (disk_number, u32),
                (disk_with_central_directory, u32),
                (number_of_files_on_this_disk, u64),
                (number_of_files, u64),
                (central_directory_size, u64),
                (central_directory_offset, u64),
            ]
        ];
        self
    }

    fn magic(self) -> Magic {
        self.magic
    }
}

#[derive(Copy, Clone, Debug)]
#[repr(packed)]
pub(crate) struct ZipCentralEntryBlock {
    pub magic: Magic,
    pub version_made_by: u16,
    pub version_to_extract: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
    pub file_comment_length: u16,
    pub disk_number: u16,
    pub internal_file_attributes: u16,
    pub external_file_attributes: u32,
    pub offset: u32,
}

impl Block for ZipCentralEntryBlock {
    const MAGIC: Magic = CENTRAL_DIRECTORY_HEADER_SIGNATURE;

    #[inline(always)]
    fn from_le(mut self) -> Self {
        from_le![
            self,
            [
                (magic, Magic),
                (version_made_by, u16),
                (version_to_extract, u16),
                (flags, u16),
                (compression_method, u16),
                (last_mod_time, u16),
                (last_mod_date, u16),
                (crc32, u32),
                (compressed_size, u32),
                (uncompressed_size, u32),
                (file_name_length, u16),
                (extra_field_length, u16),
                (file_comment_length, u16),
                (disk_number, u16),
                (internal_file_attributes, u16),
                (external_file_attributes, u32),
                (offset, u32),
            ]
        ];
        self
    }

    fn magic(self) -> Magic {
        self.magic
    }
}

#[derive(Copy, Clone, Debug)]
#[repr(packed)]
pub(crate) struct ZipLocalEntryBlock {
    pub magic: Magic,
    pub version_made_by: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
}

impl Block for ZipLocalEntryBlock {
    const MAGIC: Magic = LOCAL_FILE_HEADER_SIGNATURE;

    #[inline(always)]
    fn from_le(mut self) -> Self {
        from_le![
            self,
            [
                (magic, Magic),
                (version_made_by, u16),
                (flags, u16),
                (compression_method, u16),
                (last_mod_time, u16),
                (last_mod_date, u16),
                (crc32, u32),
                (compressed_size, u32),
                (uncompressed_size, u32),
                (file_name_length, u16),
                (extra_field_length, u16),
            ]
        ];
        self
    }

    fn magic(self) -> Magic {
        self.magic
    }
}

/// Where the central directory lives, as recorded by the end of central directory.
#[derive(Debug, Clone)]
pub(crate) struct CentralDirectoryInfo {
    /// Bytes prepended before the archive proper; added to every recorded offset.
    pub(crate) archive_offset: u64,
    pub(crate) directory_start: u64,
    pub(crate) directory_size: u64,
    pub(crate) number_of_files: usize,
    pub(crate) eocd_position: u64,
    pub(crate) is_zip64: bool,
    pub(crate) comment: Box<[u8]>,
}

/// Scan backward from the end of `source` for the end of central directory record.
///
/// The record is anchored `size_of::<Zip32CDEBlock>()` bytes before the end and only
/// followed by its comment, so candidates are searched no further back than the longest
/// possible comment. Signature bytes can also occur inside a comment, always after the
/// record that owns it, so the earliest usable candidate wins. A candidate whose comment ends
/// exactly at the end of the source is preferred over one followed by unannounced bytes, and
/// either kind must announce a central directory that really precedes it.
pub(crate) fn find_central_directory<S: ByteSource + ?Sized>(
    source: &S,
) -> FsResult<CentralDirectoryInfo> {
    let file_length = source.len();
    let block_len = size_of::<Zip32CDEBlock>() as u64;
    let window = block_len + MAX_COMMENT_LENGTH;

    if file_length < block_len {
        return Err(FsError::NoCentralDirectory {
            searched: file_length,
        });
    }

    let anchor = file_length - block_len;
    let lower_bound = file_length.saturating_sub(window);
    let magic = CENTRAL_DIRECTORY_END_SIGNATURE.to_le_bytes();
    let mut finder = MagicFinder::new(&magic, (lower_bound, anchor + magic.len() as u64));

    let mut candidates = Vec::new();
    while let Some(position) = finder.next_back(source)? {
        if let Some(block) = Zip32CDEBlock::read_at(source, position)? {
            let comment_end = position + block_len + u64::from(block.zip_file_comment_length);
            if comment_end <= file_length {
                candidates.push((position, block, comment_end == file_length));
            }
        }
    }

    let mut exact = None;
    let mut tolerated = None;
    let mut unconvincing: Option<(u64, Zip32CDEBlock, bool)> = None;
    for &(position, block, fits) in candidates.iter().rev() {
        if !announces_preceding_directory(source, position, block)? {
            trace!(position, "end record does not follow a central directory");
            if unconvincing.is_none_or(|(_, _, earlier_fits)| fits && !earlier_fits) {
                unconvincing = Some((position, block, fits));
            }
        } else if fits {
            exact.get_or_insert((position, block));
        } else {
            tolerated.get_or_insert((position, block));
        }
    }

    if let Some((position, block)) = exact {
        return central_directory_info(source, position, block);
    }
    let chosen = tolerated.or(unconvincing.map(|(position, block, _)| (position, block)));
    match chosen {
        Some((position, block)) => {
            if position + block_len + u64::from(block.zip_file_comment_length) < file_length {
                warn!(
                    position,
                    trailing = file_length - position,
                    "end of central directory record is followed by unannounced bytes"
                );
            }
            central_directory_info(source, position, block)
        }
        None => Err(FsError::NoCentralDirectory {
            searched: file_length - lower_bound,
        }),
    }
}

/// Whether the end record at `position` follows the central directory it announces: either a
/// ZIP64 locator or the first central header sits where the record says, or the archive is
/// empty.
fn announces_preceding_directory<S: ByteSource + ?Sized>(
    source: &S,
    position: u64,
    block: Zip32CDEBlock,
) -> io::Result<bool> {
    if let Some(locator_position) = position.checked_sub(size_of::<Zip64CDELocatorBlock>() as u64)
    {
        if Zip64CDELocatorBlock::read_at(source, locator_position)?.is_some() {
            return Ok(true);
        }
    }
    let Zip32CDEBlock {
        number_of_files,
        central_directory_size,
        ..
    } = block;
    if number_of_files == 0 {
        return Ok(central_directory_size == 0);
    }
    let Some(directory_start) = position.checked_sub(u64::from(central_directory_size)) else {
        return Ok(false);
    };
    let signature = source.read_vec_at(directory_start, 4)?;
    Ok(signature == CENTRAL_DIRECTORY_HEADER_SIGNATURE.to_le_bytes())
}

fn central_directory_info<S: ByteSource + ?Sized>(
    source: &S,
    eocd_position: u64,
    block: Zip32CDEBlock,
) -> FsResult<CentralDirectoryInfo> {
    let Zip32CDEBlock {
        disk_number,
        disk_with_central_directory,
        number_of_files,
        central_directory_size,
        central_directory_offset,
        zip_file_comment_length,
        ..
    } = block;
    let comment_start = eocd_position + size_of::<Zip32CDEBlock>() as u64;
    let comment = source
        .read_vec_at(comment_start, zip_file_comment_length as usize)?
        .into_boxed_slice();

    let mut disks = (u32::from(disk_number), u32::from(disk_with_central_directory));
    let mut number_of_files = u64::from(number_of_files);
    let mut directory_size = u64::from(central_directory_size);
    let mut directory_offset = u64::from(central_directory_offset);
    let mut directory_end = eocd_position;
    let mut is_zip64 = false;

    if let Some((zip64_position, zip64)) = find_zip64_end(source, eocd_position)? {
        debug!(zip64_position, "using ZIP64 end of central directory record");
        disks = (zip64.disk_number, zip64.disk_with_central_directory);
        number_of_files = zip64.number_of_files;
        directory_size = zip64.central_directory_size;
        directory_offset = zip64.central_directory_offset;
        directory_end = zip64_position;
        is_zip64 = true;
    }

    if disks.0 != disks.1 {
        return Err(FsError::Unsupported {
            path: "".into(),
            feature: "archives split across multiple disks".into(),
        });
    }

    let Some(recorded_end) = directory_offset.checked_add(directory_size) else {
        return malformed_central(eocd_position, "central directory bounds overflow");
    };
    let Some(archive_offset) = directory_end.checked_sub(recorded_end) else {
        return malformed_central(
            eocd_position,
            "central directory extends past its end record",
        );
    };
    if archive_offset > 0 {
        debug!(archive_offset, "archive is preceded by prepended data");
    }
    let directory_start = directory_offset + archive_offset;

    // Every central directory header is at least 46 bytes.
    let min_size = number_of_files.saturating_mul(size_of::<ZipCentralEntryBlock>() as u64);
    if min_size > directory_size {
        return malformed_central(
            directory_start,
            format!("{number_of_files} entries cannot fit in {directory_size} bytes"),
        );
    }
    if !in_bounds(source.len(), directory_start, directory_size) {
        return Err(FsError::MalformedCentralDirectory {
            offset: directory_start,
            reason: format!(
                "{directory_size} bytes of central directory exceed the source length {}",
                source.len()
            )
            .into(),
        });
    }

    Ok(CentralDirectoryInfo {
        archive_offset,
        directory_start,
        directory_size,
        number_of_files: number_of_files as usize,
        eocd_position,
        is_zip64,
        comment,
    })
}

/// Look for the ZIP64 locator immediately before the end record and follow it.
fn find_zip64_end<S: ByteSource + ?Sized>(
    source: &S,
    eocd_position: u64,
) -> FsResult<Option<(u64, Zip64CDEBlock)>> {
    let locator_len = size_of::<Zip64CDELocatorBlock>() as u64;
    let Some(locator_position) = eocd_position.checked_sub(locator_len) else {
        return Ok(None);
    };
    let Some(locator) = Zip64CDELocatorBlock::read_at(source, locator_position)? else {
        return Ok(None);
    };
    if locator.number_of_disks > 1 {
        return Err(FsError::Unsupported {
            path: "".into(),
            feature: "archives split across multiple disks".into(),
        });
    }

    let recorded = locator.end_of_central_directory_offset;
    // With prepended data the recorded offset is stale; the record normally sits right
    // before the locator.
    let adjacent = locator_position.checked_sub(size_of::<Zip64CDEBlock>() as u64);
    for candidate in [Some(recorded), adjacent].into_iter().flatten() {
        if !in_bounds(source.len(), candidate, size_of::<Zip64CDEBlock>() as u64) {
            continue;
        }
        if let Some(block) = Zip64CDEBlock::read_at(source, candidate)? {
            return Ok(Some((candidate, block)));
        }
    }
    malformed_central(
        locator_position,
        "ZIP64 locator does not point at a ZIP64 end of central directory record",
    )
}
