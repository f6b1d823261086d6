//! Read ZIP archives as an entry stream.

use std::collections::VecDeque;
use std::io::Read;
use std::vec;

use indexmap::IndexMap;
use time::OffsetDateTime;
use tracing::{debug, trace, warn};

use crate::compression::{CompressionMethod, Decompressor};
use crate::cp437::FromCp437;
use crate::crc32::Crc32Reader;
use crate::entry::{Entry, EntryPath, EntryStream};
use crate::extra_fields::{Zip64Sentinels, best_modification_time, parse_extra_fields};
use crate::path::{is_dir_name, zip_name_to_path};
use crate::read::magic_finder::find_forward;
use crate::read::{Config, Fuse, check_content_size};
use crate::result::{FsError, FsResult, malformed_central};
use crate::source::{ByteSource, in_bounds};
use crate::spec::{
    self, Block, CentralDirectoryInfo, DATA_DESCRIPTOR_SIGNATURE, ZipCentralEntryBlock,
    ZipLocalEntryBlock,
};
use crate::types::{DOS_DIRECTORY_ATTRIBUTE, DateTime, ffi};
use crate::unstable::LittleEndianReadExt;

const FLAG_ENCRYPTED: u16 = 1;
const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
const FLAG_UTF8: u16 = 1 << 11;

/// Upper bound on the buffer reserved up front for one entry's content.
const MAX_PREALLOCATION: u64 = 1 << 24;

/// One central directory record, decoded.
#[derive(Debug, Clone)]
struct CentralEntry {
    file_name: Box<str>,
    file_name_raw: Box<[u8]>,
    is_dir: bool,
    flags: u16,
    compression_method: CompressionMethod,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    /// Absolute offset of the local header, with prepended data accounted for.
    header_start: u64,
    central_header_start: u64,
    /// Whether a ZIP64 extra field was present; data descriptors then carry 8-byte sizes.
    large_file: bool,
    last_modified: Option<OffsetDateTime>,
}

/// Where an entry's payload lives and what it must decode to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DataRange {
    start: u64,
    compressed_size: u64,
    uncompressed_size: u64,
    crc32: u32,
}

/// Values from a trailing data descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DataDescriptor {
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
}

/// Reads a ZIP archive from a [`ByteSource`].
///
/// The central directory is parsed once, when the reader is created. Iteration then visits
/// the central directory in physical order, reading and decompressing one entry per step.
/// Directories that are only implied by file names are synthesized the first time a path
/// needs them.
///
/// ```no_run
/// use containerfs::{FileSource, ZipReader};
///
/// let source = FileSource::open("archive.zip")?;
/// for entry in ZipReader::new("archive.zip", source)? {
///     let entry = entry?;
///     println!("{} {:?}", entry.path, entry.size());
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct ZipReader<S> {
    label: String,
    source: S,
    config: Config,
    archive_offset: u64,
    comment: Box<[u8]>,
    len: usize,
    entries: vec::IntoIter<CentralEntry>,
    /// Every path yielded so far, and whether it was a directory.
    emitted: IndexMap<EntryPath, bool>,
    pending: VecDeque<FsResult<Entry>>,
    fuse: Fuse,
}

impl<S: ByteSource> ZipReader<S> {
    /// Open an archive with the default [`Config`].
    ///
    /// `label` only names the archive in logs and errors.
    pub fn new(label: impl Into<String>, source: S) -> FsResult<Self> {
        Self::with_config(label, source, Config::default())
    }

    /// Open an archive, locating and parsing its central directory.
    ///
    /// # Errors
    ///
    /// Fails with [`FsError::NoCentralDirectory`] when no end of central directory record is
    /// found, and with [`FsError::MalformedCentralDirectory`] when the records cannot be read.
    pub fn with_config(label: impl Into<String>, source: S, config: Config) -> FsResult<Self> {
        let label = label.into();
        let info = spec::find_central_directory(&source)?;
        debug!(
            container = %label,
            entries = info.number_of_files,
            directory_start = info.directory_start,
            eocd_position = info.eocd_position,
            zip64 = info.is_zip64,
            "found central directory"
        );
        let entries = parse_central_directory(&source, &info)?;

        Ok(Self {
            label,
            source,
            config,
            archive_offset: info.archive_offset,
            comment: info.comment,
            len: entries.len(),
            entries: entries.into_iter(),
            emitted: IndexMap::new(),
            pending: VecDeque::new(),
            fuse: Fuse::new(&config),
        })
    }

    /// Number of records in the central directory.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the central directory is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the comment of the zip archive.
    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    /// Number of bytes prepended to the archive, e.g. a self-extractor stub.
    pub fn offset(&self) -> u64 {
        self.archive_offset
    }

    /// Unwrap and return the inner source.
    pub fn into_inner(self) -> S {
        self.source
    }

    fn visit(&mut self, central: CentralEntry) {
        let path = match zip_name_to_path(&central.file_name) {
            Ok(path) => path,
            Err(e) => {
                let item = self.fuse.settle(&self.label, e);
                self.pending.push_back(item);
                return;
            }
        };
        if path.is_root() {
            debug!(
                offset = central.central_header_start,
                name = %central.file_name,
                "skipping entry without a name"
            );
            return;
        }

        for ancestor in path.ancestors() {
            match self.emitted.get(&ancestor).copied() {
                Some(true) => {}
                Some(false) => {
                    let err = FsError::Unsupported {
                        path: path.to_string().into(),
                        feature: format!("an entry below the file `{ancestor}`").into(),
                    };
                    let item = self.fuse.settle(&self.label, err);
                    self.pending.push_back(item);
                    return;
                }
                None => {
                    trace!(path = %ancestor, "synthesizing implied directory");
                    self.emitted.insert(ancestor.clone(), true);
                    self.pending
                        .push_back(Ok(Entry::directory(ancestor, central.last_modified)));
                }
            }
        }

        if self.emitted.contains_key(&path) {
            if central.is_dir {
                trace!(path = %path, "directory was already emitted");
            } else {
                warn!(
                    container = %self.label,
                    path = %path,
                    offset = central.central_header_start,
                    "duplicate entry, keeping the first"
                );
            }
            return;
        }
        self.emitted.insert(path.clone(), central.is_dir);

        let item = if central.is_dir {
            Ok(Entry::directory(path, central.last_modified))
        } else {
            match self.read_file(&central, path) {
                Ok(entry) => Ok(entry),
                Err(e) => self.fuse.settle(&self.label, e),
            }
        };
        self.pending.push_back(item);
    }

    fn read_file(&self, central: &CentralEntry, path: EntryPath) -> FsResult<Entry> {
        let display: Box<str> = path.to_string().into();
        if central.flags & FLAG_ENCRYPTED != 0 {
            return Err(FsError::Unsupported {
                path: display,
                feature: "encrypted entry".into(),
            });
        }
        if !central.compression_method.is_supported() {
            return Err(FsError::UnsupportedCompressionMethod {
                path: display,
                method: central.compression_method.serialize_to_u16(),
            });
        }

        let data = self.locate_data(central, &display)?;
        check_content_size(&self.config, &path, data.uncompressed_size)?;
        if !in_bounds(self.source.len(), data.start, data.compressed_size) {
            return Err(FsError::TruncatedEntry {
                path: display,
                offset: data.start,
                length: data.compressed_size,
                available: self.source.len(),
            });
        }

        let compressed = self
            .source
            .read_vec_at(data.start, data.compressed_size as usize)?;
        let (content, checksum) =
            decompress(central.compression_method, &compressed, data.uncompressed_size)
                .map_err(|reason| FsError::Integrity {
                    path: display.clone(),
                    reason: reason.into(),
                })?;

        if content.len() as u64 != data.uncompressed_size {
            return Err(FsError::Integrity {
                path: display,
                reason: format!(
                    "decompressed to {} bytes, expected {}",
                    content.len(),
                    data.uncompressed_size
                )
                .into(),
            });
        }
        if self.config.verify_checksums && checksum != data.crc32 {
            return Err(FsError::Integrity {
                path: display,
                reason: format!(
                    "CRC-32 {checksum:#010x} does not match the recorded {:#010x}",
                    data.crc32
                )
                .into(),
            });
        }

        Ok(Entry::file(path, central.last_modified, content))
    }

    /// Validate the local header and find the payload it introduces.
    fn locate_data(&self, central: &CentralEntry, path: &str) -> FsResult<DataRange> {
        let header_start = central.header_start;
        let header_len = size_of::<ZipLocalEntryBlock>() as u64;
        if !in_bounds(self.source.len(), header_start, header_len) {
            return Err(FsError::TruncatedEntry {
                path: path.into(),
                offset: header_start,
                length: header_len,
                available: self.source.len(),
            });
        }
        let Some(local) = ZipLocalEntryBlock::read_at(&self.source, header_start)? else {
            return Err(FsError::InvalidArchive {
                path: path.into(),
                offset: header_start,
                reason: "missing local file header signature".into(),
            });
        };
        let ZipLocalEntryBlock {
            crc32,
            compressed_size,
            uncompressed_size,
            file_name_length,
            extra_field_length,
            ..
        } = local;

        let variable_start = header_start + header_len;
        let variable_len = u64::from(file_name_length) + u64::from(extra_field_length);
        if !in_bounds(self.source.len(), variable_start, variable_len) {
            return Err(FsError::TruncatedEntry {
                path: path.into(),
                offset: variable_start,
                length: variable_len,
                available: self.source.len(),
            });
        }
        let variable = self
            .source
            .read_vec_at(variable_start, variable_len as usize)?;
        let (file_name_raw, extra_field) = variable.split_at(file_name_length as usize);
        if file_name_raw != &*central.file_name_raw {
            return Err(FsError::InvalidArchive {
                path: path.into(),
                offset: header_start,
                reason: "local file header names a different file than the central directory"
                    .into(),
            });
        }
        let start = variable_start + variable_len;

        if central.flags & FLAG_DATA_DESCRIPTOR != 0 {
            return self.read_data_descriptor(central, start, path);
        }

        let zip64 = parse_extra_fields(
            extra_field,
            Zip64Sentinels {
                uncompressed_size: u64::from(uncompressed_size) == spec::ZIP64_BYTES_THR,
                compressed_size: u64::from(compressed_size) == spec::ZIP64_BYTES_THR,
                header_start: false,
            },
        )
        .map_err(|e| FsError::InvalidArchive {
            path: path.into(),
            offset: header_start,
            reason: e.to_string().into(),
        })?
        .zip64
        .unwrap_or_default();
        let local_compressed = zip64.compressed_size.unwrap_or(compressed_size.into());
        let local_uncompressed = zip64.uncompressed_size.unwrap_or(uncompressed_size.into());

        if (local_compressed, local_uncompressed, crc32)
            != (
                central.compressed_size,
                central.uncompressed_size,
                central.crc32,
            )
        {
            return Err(FsError::Integrity {
                path: path.into(),
                reason: format!(
                    "local header records {local_compressed} -> {local_uncompressed} bytes with \
                     CRC-32 {crc32:#010x}, central directory {} -> {} bytes with {:#010x}",
                    central.compressed_size, central.uncompressed_size, central.crc32
                )
                .into(),
            });
        }

        Ok(DataRange {
            start,
            compressed_size: central.compressed_size,
            uncompressed_size: central.uncompressed_size,
            crc32: central.crc32,
        })
    }

    /// Resolve sizes and CRC for an entry written with a trailing data descriptor.
    ///
    /// The descriptor is first looked for right after the payload length the central
    /// directory records. When the central directory records no payload, the data is scanned
    /// for the descriptor signature instead.
    fn read_data_descriptor(
        &self,
        central: &CentralEntry,
        start: u64,
        path: &str,
    ) -> FsResult<DataRange> {
        let width = if central.large_file { 8 } else { 4 };
        let expected_end = start.saturating_add(central.compressed_size);
        if let Some(descriptor) = self.descriptor_at(expected_end, width)? {
            if descriptor.compressed_size == central.compressed_size {
                if (descriptor.crc32, descriptor.uncompressed_size)
                    != (central.crc32, central.uncompressed_size)
                {
                    return Err(FsError::Integrity {
                        path: path.into(),
                        reason: "data descriptor disagrees with the central directory".into(),
                    });
                }
                return Ok(DataRange {
                    start,
                    compressed_size: central.compressed_size,
                    uncompressed_size: central.uncompressed_size,
                    crc32: central.crc32,
                });
            }
        }

        if central.compressed_size != 0 {
            if central.large_file {
                return Err(FsError::Unsupported {
                    path: path.into(),
                    feature: "data descriptor with ZIP64 sizes that do not match the central \
                              directory"
                        .into(),
                });
            }
            return Err(FsError::Integrity {
                path: path.into(),
                reason: format!(
                    "no data descriptor after {} bytes of data",
                    central.compressed_size
                )
                .into(),
            });
        }

        let magic = DATA_DESCRIPTOR_SIGNATURE.to_le_bytes();
        let mut cursor = start;
        while let Some(position) = find_forward(&self.source, &magic, cursor, self.source.len())? {
            let compressed_size = position - start;
            for width in [4, 8] {
                if let Some(descriptor) = self.descriptor_at(position, width)? {
                    if descriptor.compressed_size == compressed_size {
                        trace!(path, position, width, "found data descriptor by scanning");
                        return Ok(DataRange {
                            start,
                            compressed_size,
                            uncompressed_size: descriptor.uncompressed_size,
                            crc32: descriptor.crc32,
                        });
                    }
                }
            }
            // The signature bytes occurred inside the payload.
            cursor = position + 1;
        }

        Err(FsError::Unsupported {
            path: path.into(),
            feature: "streamed entry whose data descriptor cannot be located".into(),
        })
    }

    fn descriptor_at(&self, position: u64, width: usize) -> FsResult<Option<DataDescriptor>> {
        if position >= self.source.len() {
            return Ok(None);
        }
        let max_len = (size_of::<u32>() * 2 + width * 2) as u64;
        let available = self.source.len().saturating_sub(position).min(max_len);
        let bytes = self.source.read_vec_at(position, available as usize)?;
        Ok(parse_data_descriptor(&bytes, width))
    }
}

impl<S: ByteSource> Iterator for ZipReader<S> {
    type Item = FsResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            if self.fuse.is_blown() {
                return None;
            }
            let central = self.entries.next()?;
            self.visit(central);
        }
    }
}

impl<S: ByteSource> EntryStream for ZipReader<S> {
    fn label(&self) -> &str {
        &self.label
    }
}

/// Decode every record of the central directory.
fn parse_central_directory<S: ByteSource + ?Sized>(
    source: &S,
    info: &CentralDirectoryInfo,
) -> FsResult<Vec<CentralEntry>> {
    let buffer = source.read_vec_at(info.directory_start, info.directory_size as usize)?;
    let block_len = size_of::<ZipCentralEntryBlock>();
    let mut entries = Vec::with_capacity(info.number_of_files.min(buffer.len() / block_len));
    let mut position = 0;
    for _ in 0..info.number_of_files {
        let central_header_start = info.directory_start + position as u64;
        let (entry, record_len) = central_header_to_entry(
            &buffer[position..],
            central_header_start,
            info.archive_offset,
        )?;
        position += record_len;
        entries.push(entry);
    }
    if position < buffer.len() {
        debug!(
            unused = buffer.len() - position,
            "central directory continues past its last record"
        );
    }
    Ok(entries)
}

/// Decode one central directory record from the front of `bytes`, returning it with the
/// number of bytes it occupies.
fn central_header_to_entry(
    bytes: &[u8],
    central_header_start: u64,
    archive_offset: u64,
) -> FsResult<(CentralEntry, usize)> {
    let Some(block) = ZipCentralEntryBlock::interpret(bytes) else {
        return malformed_central(
            central_header_start,
            "missing central directory header signature",
        );
    };
    let ZipCentralEntryBlock {
        flags,
        compression_method,
        last_mod_time,
        last_mod_date,
        crc32,
        compressed_size,
        uncompressed_size,
        file_name_length,
        extra_field_length,
        file_comment_length,
        external_file_attributes,
        offset,
        ..
    } = block;

    let fixed_len = size_of::<ZipCentralEntryBlock>();
    let record_len = fixed_len
        + file_name_length as usize
        + extra_field_length as usize
        + file_comment_length as usize;
    let Some(record) = bytes.get(fixed_len..record_len) else {
        return malformed_central(
            central_header_start,
            format!("record of {record_len} bytes overruns the central directory"),
        );
    };
    let (file_name_raw, rest) = record.split_at(file_name_length as usize);
    let extra_field = &rest[..extra_field_length as usize];

    let file_name: Box<str> = if flags & FLAG_UTF8 != 0 {
        String::from_utf8_lossy(file_name_raw).into()
    } else {
        file_name_raw.from_cp437().into()
    };

    let parsed = parse_extra_fields(
        extra_field,
        Zip64Sentinels {
            uncompressed_size: u64::from(uncompressed_size) == spec::ZIP64_BYTES_THR,
            compressed_size: u64::from(compressed_size) == spec::ZIP64_BYTES_THR,
            header_start: u64::from(offset) == spec::ZIP64_BYTES_THR,
        },
    )
    .map_err(|e| FsError::MalformedCentralDirectory {
        offset: central_header_start,
        reason: format!("`{file_name}`: {e}").into(),
    })?;
    let zip64 = parsed.zip64.unwrap_or_default();

    // Account for shifted zip offsets.
    let Some(header_start) = zip64
        .header_start
        .unwrap_or(offset.into())
        .checked_add(archive_offset)
    else {
        return malformed_central(central_header_start, "local header offset overflows");
    };

    let unix_mode = external_file_attributes >> 16;
    let is_dir = is_dir_name(&file_name)
        || external_file_attributes & DOS_DIRECTORY_ATTRIBUTE != 0
        || unix_mode & ffi::S_IFMT == ffi::S_IFDIR;

    let last_modified = best_modification_time(&parsed.fields).or_else(|| {
        DateTime::try_from_msdos(last_mod_date, last_mod_time)
            .ok()?
            .to_time()
            .ok()
    });

    let entry = CentralEntry {
        file_name,
        file_name_raw: file_name_raw.into(),
        is_dir,
        flags,
        compression_method: CompressionMethod::parse_from_u16(compression_method),
        crc32,
        compressed_size: zip64.compressed_size.unwrap_or(compressed_size.into()),
        uncompressed_size: zip64.uncompressed_size.unwrap_or(uncompressed_size.into()),
        header_start,
        central_header_start,
        large_file: parsed.zip64.is_some(),
        last_modified,
    };
    Ok((entry, record_len))
}

/// Parse a data descriptor whose sizes are `width` bytes wide; the signature is optional.
fn parse_data_descriptor(bytes: &[u8], width: usize) -> Option<DataDescriptor> {
    let mut reader = bytes
        .strip_prefix(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes()[..])
        .unwrap_or(bytes);
    let crc32 = reader.read_u32_le().ok()?;
    let (compressed_size, uncompressed_size) = if width == 8 {
        (reader.read_u64_le().ok()?, reader.read_u64_le().ok()?)
    } else {
        (
            reader.read_u32_le().ok()?.into(),
            reader.read_u32_le().ok()?.into(),
        )
    };
    Some(DataDescriptor {
        crc32,
        compressed_size,
        uncompressed_size,
    })
}

/// Decode `compressed`, reading at most one byte past `expected` so oversized output is
/// detected without inflating all of it.
fn decompress(
    method: CompressionMethod,
    compressed: &[u8],
    expected: u64,
) -> Result<(Vec<u8>, u32), String> {
    let Some(decoder) = Decompressor::new(method, compressed) else {
        return Err(format!("cannot decode {method}"));
    };
    let mut reader = Crc32Reader::new(decoder.take(expected.saturating_add(1)));
    let mut content = Vec::with_capacity(expected.min(MAX_PREALLOCATION) as usize);
    reader
        .read_to_end(&mut content)
        .map_err(|e| format!("corrupt {method} data: {e}"))?;
    trace!(%method, compressed = compressed.len(), decompressed = reader.count(), "decoded entry");
    Ok((content, reader.checksum()))
}
