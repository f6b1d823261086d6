use std::io::{self, Read};

use time::OffsetDateTime;

use crate::types::filetime_to_time;
use crate::unstable::LittleEndianReadExt;

/// The NTFS extra field as described in [PKWARE's APPNOTE.TXT v6.3.9].
///
/// This field stores [Windows file times], which are 64-bit unsigned integer
/// values that represents the number of 100-nanosecond intervals that have
/// elapsed since "1601-01-01 00:00 UTC".
///
/// [PKWARE's APPNOTE.TXT v6.3.9]: https://pkware.cachefly.net/webdocs/casestudies/APPNOTE.TXT
/// [Windows file times]: https://docs.microsoft.com/en-us/windows/win32/sysinfo/file-times
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ntfs {
    mtime: u64,
    atime: u64,
    ctime: u64,
}

impl Ntfs {
    /// Creates a NTFS extra field struct by reading the required bytes from the
    /// reader.
    ///
    /// This method assumes that the length has already been read, therefore it
    /// must be passed as an argument.
    pub fn try_from_reader<R>(reader: &mut R, len: u16) -> io::Result<Self>
    where
        R: Read,
    {
        let mut remaining = usize::from(len);
        // Reserved field
        reader.skip_exact(4)?;
        remaining = remaining.saturating_sub(4);

        // Only the first attribute (tag 0x0001, size 24) holds file times.
        let tag = reader.read_u16_le()?;
        let size = reader.read_u16_le()?;
        remaining = remaining.saturating_sub(4);
        if tag != 0x0001 || size != 24 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("NTFS extra field has no timestamp attribute (tag={tag:#06x} size={size})"),
            ));
        }

        let mtime = reader.read_u64_le()?;
        let atime = reader.read_u64_le()?;
        let ctime = reader.read_u64_le()?;
        remaining = remaining.saturating_sub(24);
        reader.skip_exact(remaining)?;

        Ok(Self {
            mtime,
            atime,
            ctime,
        })
    }

    /// Returns the file last modification time as a file time.
    #[must_use]
    pub const fn mtime_raw(&self) -> u64 {
        self.mtime
    }

    /// Returns the file last access time as a file time.
    #[must_use]
    pub const fn atime_raw(&self) -> u64 {
        self.atime
    }

    /// Returns the file creation time as a file time.
    #[must_use]
    pub const fn ctime_raw(&self) -> u64 {
        self.ctime
    }

    /// Returns the file last modification time, or `None` when unset.
    #[must_use]
    pub fn mtime(&self) -> Option<OffsetDateTime> {
        filetime_to_time(self.mtime)
    }
}
