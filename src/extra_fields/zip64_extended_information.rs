//! 4.5.3 -Zip64 Extended Information Extra Field (0x0001)
//!
//! | Value                  | Size    | Description                                  |
//! | ---------------------- | ------- | -------------------------------------------- |
//! | `0x0001`               | 2 bytes | Tag for this "extra" block type              |
//! | Size                   | 2 bytes | Size of this "extra" block                   |
//! | Original Size          | 8 bytes | Original uncompressed file size              |
//! | Compressed Size        | 8 bytes | Size of compressed data                      |
//! | Relative Header Offset | 8 bytes | Offset of local header record                |
//! | Disk Start Number      | 4 bytes | Number of the disk on which this file starts |
//!
//! A value appears only when the matching fixed-header field holds its 0xFFFFFFFF sentinel,
//! and the values that do appear keep this order.

use std::io;

use super::Zip64Sentinels;
use crate::unstable::LittleEndianReadExt;

/// Zip64 extended information extra field
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Zip64ExtendedInformation {
    pub(crate) uncompressed_size: Option<u64>,
    pub(crate) compressed_size: Option<u64>,
    pub(crate) header_start: Option<u64>,
}

impl Zip64ExtendedInformation {
    pub(crate) fn parse(body: &[u8], sentinels: Zip64Sentinels) -> io::Result<Self> {
        let len = body.len();
        let mut reader = body;
        let mut info = Self::default();

        // Some writers emit both sizes whenever the field is present; a 24-byte body always
        // carries them.
        if sentinels.uncompressed_size || len >= 24 {
            info.uncompressed_size = Some(reader.read_u64_le()?);
        }
        if sentinels.compressed_size || len >= 24 {
            info.compressed_size = Some(reader.read_u64_le()?);
        }
        if sentinels.header_start {
            info.header_start = Some(reader.read_u64_le().map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    "ZIP64 extra field is missing the local header offset",
                )
            })?);
        }
        Ok(info)
    }
}
