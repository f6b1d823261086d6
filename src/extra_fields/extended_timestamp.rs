use std::io::{self, Read};

use time::OffsetDateTime;

use crate::types::unix_seconds_to_time;
use crate::unstable::LittleEndianReadExt;

/// extended timestamp, as described in <https://libzip.org/specifications/extrafld.txt>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedTimestamp {
    mod_time: Option<u32>,
    ac_time: Option<u32>,
    cr_time: Option<u32>,
}

impl ExtendedTimestamp {
    /// creates an extended timestamp struct by reading the required bytes from the reader.
    ///
    /// This method assumes that the length has already been read, therefore
    /// it must be passed as an argument
    ///
    /// # Errors
    ///
    /// Fails if the len is empty, disagrees with the flags, or a read fails
    pub fn try_from_reader<R>(reader: &mut R, len: u16) -> io::Result<Self>
    where
        R: Read,
    {
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "extended timestamp field is empty",
            ));
        }
        let flags = reader.read_u8()?;
        let mut bytes_to_read = len as usize - 1;

        // Central directory copies keep the local flags but usually carry only the
        // modification time, so a 1+4 body is read as exactly that.
        if len != 5 && u32::from(len) != 1 + 4 * flags.count_ones() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("flags and len don't match in extended timestamp field len={len} flags={flags:08b}"),
            ));
        }

        let mut next = |present: bool| -> io::Result<Option<u32>> {
            if present {
                bytes_to_read -= size_of::<u32>();
                reader.read_u32_le().map(Some)
            } else {
                Ok(None)
            }
        };
        let mod_time = next(flags & 0b001 != 0 || len == 5)?;
        let ac_time = next(flags & 0b010 != 0 && len > 5)?;
        let cr_time = next(flags & 0b100 != 0 && len > 5)?;

        // undocumented trailing bytes
        reader.skip_exact(bytes_to_read)?;

        Ok(Self {
            mod_time,
            ac_time,
            cr_time,
        })
    }

    /// returns the last modification timestamp, if defined, as UNIX epoch seconds
    #[must_use]
    pub fn mod_time(&self) -> Option<u32> {
        self.mod_time
    }

    /// returns the last access timestamp, if defined, as UNIX epoch seconds
    #[must_use]
    pub fn ac_time(&self) -> Option<u32> {
        self.ac_time
    }

    /// returns the creation timestamp, if defined, as UNIX epoch seconds
    #[must_use]
    pub fn cr_time(&self) -> Option<u32> {
        self.cr_time
    }

    /// The modification time as a calendar time in UTC.
    #[must_use]
    pub fn mod_time_as_time(&self) -> Option<OffsetDateTime> {
        self.mod_time
            .and_then(|seconds| unix_seconds_to_time(i64::from(seconds)))
    }
}
