#![allow(dead_code)]

//! Builders for small, hand-laid-out images and archives.

use std::io::Write;

pub const SECTOR: usize = 2048;

/// Recording time used by every builder: 2024-05-02 07:30:25 UTC.
pub const RECORDED_UNIX: i64 = 1_714_635_025;
/// The same moment in DOS resolution (two seconds).
pub const DOS_UNIX: i64 = 1_714_635_024;

pub const FLAG_DIRECTORY: u8 = 0x02;
pub const FLAG_NOT_FINAL: u8 = 0x80;

/// Encode a directory record.
pub fn record(extent: u32, data_length: u32, flags: u8, identifier: &[u8]) -> Vec<u8> {
    let mut length = 33 + identifier.len();
    length += length % 2;
    let mut out = vec![0u8; length];
    out[0] = length as u8;
    out[2..6].copy_from_slice(&extent.to_le_bytes());
    out[6..10].copy_from_slice(&extent.to_be_bytes());
    out[10..14].copy_from_slice(&data_length.to_le_bytes());
    out[14..18].copy_from_slice(&data_length.to_be_bytes());
    out[18..25].copy_from_slice(&[124, 5, 2, 7, 30, 25, 0]);
    out[25] = flags;
    out[28..32].copy_from_slice(&[1, 0, 0, 1]);
    out[32] = identifier.len() as u8;
    out[33..33 + identifier.len()].copy_from_slice(identifier);
    out
}

pub fn dir_record(extent: u32, identifier: &str) -> Vec<u8> {
    record(extent, SECTOR as u32, FLAG_DIRECTORY, identifier.as_bytes())
}

pub fn file_record(extent: u32, length: u32, identifier: &str) -> Vec<u8> {
    record(extent, length, 0, identifier.as_bytes())
}

/// Lays out an ISO 9660 image sector by sector.
///
/// The primary volume descriptor sits at sector 16 and the terminator at 17, so content
/// starts at sector 18.
pub struct IsoBuilder {
    image: Vec<u8>,
}

impl IsoBuilder {
    pub fn new(sectors: usize, root_extent: u32) -> Self {
        let mut image = vec![0u8; sectors * SECTOR];

        let pvd = &mut image[16 * SECTOR..17 * SECTOR];
        pvd[0] = 1;
        pvd[1..6].copy_from_slice(b"CD001");
        pvd[6] = 1;
        pvd[8..40].fill(b' ');
        pvd[8..13].copy_from_slice(b"LINUX");
        pvd[40..72].fill(b' ');
        pvd[40..48].copy_from_slice(b"TESTDISC");
        pvd[80..84].copy_from_slice(&(sectors as u32).to_le_bytes());
        pvd[84..88].copy_from_slice(&(sectors as u32).to_be_bytes());
        pvd[128..130].copy_from_slice(&(SECTOR as u16).to_le_bytes());
        pvd[130..132].copy_from_slice(&(SECTOR as u16).to_be_bytes());
        let root = record(root_extent, SECTOR as u32, FLAG_DIRECTORY, &[0]);
        pvd[156..156 + root.len()].copy_from_slice(&root);
        pvd[813..829].copy_from_slice(b"2024050207302500");
        pvd[830..846].copy_from_slice(b"2024050207302500");

        let terminator = &mut image[17 * SECTOR..18 * SECTOR];
        terminator[0] = 255;
        terminator[1..6].copy_from_slice(b"CD001");
        terminator[6] = 1;

        Self { image }
    }

    /// Write a one-sector directory at `extent` holding `.`, `..` and `children`.
    pub fn directory(mut self, extent: u32, parent: u32, children: &[Vec<u8>]) -> Self {
        let mut records = vec![
            record(extent, SECTOR as u32, FLAG_DIRECTORY, &[0]),
            record(parent, SECTOR as u32, FLAG_DIRECTORY, &[1]),
        ];
        records.extend(children.iter().cloned());
        let mut at = extent as usize * SECTOR;
        for record in records {
            self.image[at..at + record.len()].copy_from_slice(&record);
            at += record.len();
        }
        assert!(at <= (extent as usize + 1) * SECTOR, "directory overflows its sector");
        self
    }

    pub fn data(mut self, extent: u32, bytes: &[u8]) -> Self {
        let at = extent as usize * SECTOR;
        self.image[at..at + bytes.len()].copy_from_slice(bytes);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.image
    }
}

/// The image most tests use:
///
/// ```text
/// /BIGFILE.TXT    2548 bytes in two extents (21, 22)
/// /DOCS/          extent 19
/// /DOCS/NOTES.TXT 5 bytes at 23
/// /README.TXT     10 bytes at 20
/// ```
pub fn sample_iso() -> Vec<u8> {
    IsoBuilder::new(24, 18)
        .directory(
            18,
            18,
            &[
                record(21, SECTOR as u32, FLAG_NOT_FINAL, b"BIGFILE.TXT;1"),
                file_record(22, 500, "BIGFILE.TXT;1"),
                dir_record(19, "DOCS"),
                file_record(20, 10, "README.TXT;1"),
            ],
        )
        .directory(19, 18, &[file_record(23, 5, "NOTES.TXT;1")])
        .data(20, b"hello iso\n")
        .data(21, &[b'a'; SECTOR])
        .data(22, &[b'b'; 500])
        .data(23, b"notes")
        .finish()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Stored,
    Deflated,
    Raw(u16),
}

struct ZipEntry {
    name: Vec<u8>,
    data: Vec<u8>,
    method: Method,
    directory: bool,
    data_descriptor: bool,
    crc_override: Option<u32>,
    extra: Vec<u8>,
    flags: u16,
    zip64: bool,
    sizes_in_descriptor_only: bool,
}

/// Writes a ZIP archive by hand, one record at a time.
#[derive(Default)]
pub struct ZipBuilder {
    prefix: Vec<u8>,
    entries: Vec<ZipEntry>,
    comment: Vec<u8>,
    zip64_end: bool,
    trailing: Vec<u8>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(self, name: &str, data: &[u8]) -> Self {
        self.entry(name.as_bytes(), data, Method::Stored, false)
    }

    pub fn deflated(self, name: &str, data: &[u8]) -> Self {
        self.entry(name.as_bytes(), data, Method::Deflated, false)
    }

    pub fn directory(self, name: &str) -> Self {
        self.entry(name.as_bytes(), b"", Method::Stored, true)
    }

    pub fn entry(mut self, name: &[u8], data: &[u8], method: Method, directory: bool) -> Self {
        self.entries.push(ZipEntry {
            name: name.to_vec(),
            data: data.to_vec(),
            method,
            directory,
            data_descriptor: false,
            crc_override: None,
            extra: Vec::new(),
            flags: 0,
            zip64: false,
            sizes_in_descriptor_only: false,
        });
        self
    }

    /// Write the last entry's sizes and CRC after its data instead of in its local header.
    pub fn with_data_descriptor(mut self) -> Self {
        self.last().data_descriptor = true;
        self
    }

    /// Like [`Self::with_data_descriptor`], but the central directory records zero sizes
    /// and CRC as well, so the descriptor has to be found by scanning.
    pub fn with_descriptor_only(mut self) -> Self {
        let entry = self.last();
        entry.data_descriptor = true;
        entry.sizes_in_descriptor_only = true;
        self
    }

    /// Move the last entry's sizes and local header offset into a ZIP64 extra field.
    pub fn with_zip64(mut self) -> Self {
        self.last().zip64 = true;
        self
    }

    /// Record a wrong CRC for the last entry.
    pub fn with_crc(mut self, crc: u32) -> Self {
        self.last().crc_override = Some(crc);
        self
    }

    pub fn with_extra(mut self, extra: &[u8]) -> Self {
        self.last().extra = extra.to_vec();
        self
    }

    pub fn with_flags(mut self, flags: u16) -> Self {
        self.last().flags |= flags;
        self
    }

    /// Bytes placed before the archive, as a self-extractor stub would be.
    pub fn prefix(mut self, bytes: &[u8]) -> Self {
        self.prefix = bytes.to_vec();
        self
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    /// End the archive with a ZIP64 end of central directory record and locator.
    pub fn zip64_end(mut self) -> Self {
        self.zip64_end = true;
        self
    }

    /// Bytes appended after the end record without being announced as comment.
    pub fn trailing(mut self, bytes: &[u8]) -> Self {
        self.trailing = bytes.to_vec();
        self
    }

    fn last(&mut self) -> &mut ZipEntry {
        self.entries.last_mut().expect("no entry to modify")
    }

    pub fn finish(self) -> Vec<u8> {
        const DOS_TIME: u16 = (7 << 11) | (30 << 5) | 12;
        const DOS_DATE: u16 = ((2024 - 1980) << 9) | (5 << 5) | 2;

        let mut archive = Vec::new();
        let mut central = Vec::new();
        for entry in &self.entries {
            let crc = entry
                .crc_override
                .unwrap_or_else(|| crc32fast::hash(&entry.data));
            let (method, payload) = match entry.method {
                Method::Stored => (0u16, entry.data.clone()),
                Method::Deflated => (8, deflate(&entry.data)),
                Method::Raw(method) => (method, entry.data.clone()),
            };
            let flags = entry.flags | if entry.data_descriptor { 1 << 3 } else { 0 };
            let offset = archive.len() as u32;

            let compressed = payload.len() as u64;
            let size = entry.data.len() as u64;
            let mut local_extra = Vec::new();
            let mut central_extra = Vec::new();
            if entry.zip64 {
                local_extra = zip64_field(&[size, compressed]);
                central_extra = zip64_field(&[size, compressed, offset as u64]);
            }
            local_extra.extend_from_slice(&entry.extra);
            central_extra.extend_from_slice(&entry.extra);

            let (local_crc, local_compressed, local_size) = if entry.data_descriptor {
                (0, 0, 0)
            } else if entry.zip64 {
                (crc, u32::MAX, u32::MAX)
            } else {
                (crc, compressed as u32, size as u32)
            };
            archive.extend_from_slice(&0x04034b50u32.to_le_bytes());
            archive.extend_from_slice(&20u16.to_le_bytes());
            archive.extend_from_slice(&flags.to_le_bytes());
            archive.extend_from_slice(&method.to_le_bytes());
            archive.extend_from_slice(&DOS_TIME.to_le_bytes());
            archive.extend_from_slice(&DOS_DATE.to_le_bytes());
            archive.extend_from_slice(&local_crc.to_le_bytes());
            archive.extend_from_slice(&local_compressed.to_le_bytes());
            archive.extend_from_slice(&local_size.to_le_bytes());
            archive.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
            archive.extend_from_slice(&(local_extra.len() as u16).to_le_bytes());
            archive.extend_from_slice(&entry.name);
            archive.extend_from_slice(&local_extra);
            archive.extend_from_slice(&payload);
            if entry.data_descriptor {
                archive.extend_from_slice(&0x08074b50u32.to_le_bytes());
                archive.extend_from_slice(&crc.to_le_bytes());
                if entry.zip64 {
                    archive.extend_from_slice(&compressed.to_le_bytes());
                    archive.extend_from_slice(&size.to_le_bytes());
                } else {
                    archive.extend_from_slice(&(compressed as u32).to_le_bytes());
                    archive.extend_from_slice(&(size as u32).to_le_bytes());
                }
            }

            let (central_crc, central_compressed, central_size, central_offset) =
                if entry.sizes_in_descriptor_only {
                    (0, 0, 0, offset)
                } else if entry.zip64 {
                    (crc, u32::MAX, u32::MAX, u32::MAX)
                } else {
                    (crc, compressed as u32, size as u32, offset)
                };
            let external: u32 = if entry.directory {
                (0o040755 << 16) | 0x10
            } else {
                0o100644 << 16
            };
            central.extend_from_slice(&0x02014b50u32.to_le_bytes());
            central.extend_from_slice(&((3u16 << 8) | 20).to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes());
            central.extend_from_slice(&flags.to_le_bytes());
            central.extend_from_slice(&method.to_le_bytes());
            central.extend_from_slice(&DOS_TIME.to_le_bytes());
            central.extend_from_slice(&DOS_DATE.to_le_bytes());
            central.extend_from_slice(&central_crc.to_le_bytes());
            central.extend_from_slice(&central_compressed.to_le_bytes());
            central.extend_from_slice(&central_size.to_le_bytes());
            central.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
            central.extend_from_slice(&(central_extra.len() as u16).to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes()); // comment
            central.extend_from_slice(&0u16.to_le_bytes()); // disk
            central.extend_from_slice(&0u16.to_le_bytes()); // internal attributes
            central.extend_from_slice(&external.to_le_bytes());
            central.extend_from_slice(&central_offset.to_le_bytes());
            central.extend_from_slice(&entry.name);
            central.extend_from_slice(&central_extra);
        }

        let directory_start = archive.len() as u64;
        archive.extend_from_slice(&central);
        let entries = self.entries.len() as u64;
        let (eocd_entries, eocd_size, eocd_start) = if self.zip64_end {
            let record_start = archive.len() as u64;
            archive.extend_from_slice(&0x06064b50u32.to_le_bytes());
            archive.extend_from_slice(&44u64.to_le_bytes()); // size of the remaining record
            archive.extend_from_slice(&((3u16 << 8) | 45).to_le_bytes());
            archive.extend_from_slice(&45u16.to_le_bytes());
            archive.extend_from_slice(&0u32.to_le_bytes()); // disk
            archive.extend_from_slice(&0u32.to_le_bytes()); // disk with the directory
            archive.extend_from_slice(&entries.to_le_bytes());
            archive.extend_from_slice(&entries.to_le_bytes());
            archive.extend_from_slice(&(central.len() as u64).to_le_bytes());
            archive.extend_from_slice(&directory_start.to_le_bytes());

            archive.extend_from_slice(&0x07064b50u32.to_le_bytes());
            archive.extend_from_slice(&0u32.to_le_bytes());
            archive.extend_from_slice(&record_start.to_le_bytes());
            archive.extend_from_slice(&1u32.to_le_bytes()); // total disks
            (u16::MAX, u32::MAX, u32::MAX)
        } else {
            (entries as u16, central.len() as u32, directory_start as u32)
        };
        archive.extend_from_slice(&0x06054b50u32.to_le_bytes());
        archive.extend_from_slice(&0u16.to_le_bytes());
        archive.extend_from_slice(&0u16.to_le_bytes());
        archive.extend_from_slice(&eocd_entries.to_le_bytes());
        archive.extend_from_slice(&eocd_entries.to_le_bytes());
        archive.extend_from_slice(&eocd_size.to_le_bytes());
        archive.extend_from_slice(&eocd_start.to_le_bytes());
        archive.extend_from_slice(&(self.comment.len() as u16).to_le_bytes());
        archive.extend_from_slice(&self.comment);
        archive.extend_from_slice(&self.trailing);

        let mut out = self.prefix;
        out.extend(archive);
        out
    }
}

/// A ZIP64 extended information field (0x0001) holding `values` in order.
fn zip64_field(values: &[u64]) -> Vec<u8> {
    let mut out = 0x0001u16.to_le_bytes().to_vec();
    out.extend_from_slice(&(values.len() as u16 * 8).to_le_bytes());
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder =
        flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Collect `(path, content)` pairs, panicking on the first error.
pub fn listing<I>(entries: I) -> Vec<(String, Option<Vec<u8>>)>
where
    I: IntoIterator<Item = containerfs::FsResult<containerfs::Entry>>,
{
    entries
        .into_iter()
        .map(|entry| {
            let entry = entry.unwrap();
            (entry.path.to_string(), entry.content)
        })
        .collect()
}
