use std::io::{self, Read};

use time::OffsetDateTime;

use crate::types::unix_seconds_to_time;
use crate::unstable::LittleEndianReadExt;

/// Info-ZIP Unix (original) extra field, tag `0x5855`.
///
/// Access and modification times are 32-bit Unix seconds. The local copy may
/// append the owner's uid and gid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoZipUnix {
    atime: u32,
    mtime: u32,
    owner: Option<(u16, u16)>,
}

impl InfoZipUnix {
    /// Reads the field body; `len` is the body length from the record header.
    pub fn try_from_reader<R>(reader: &mut R, len: u16) -> io::Result<Self>
    where
        R: Read,
    {
        let atime = reader.read_u32_le()?;
        let mtime = reader.read_u32_le()?;
        let owner = if len >= 12 {
            Some((reader.read_u16_le()?, reader.read_u16_le()?))
        } else {
            None
        };
        Ok(Self {
            atime,
            mtime,
            owner,
        })
    }

    /// Last access time as Unix seconds.
    #[must_use]
    pub const fn atime_raw(&self) -> u32 {
        self.atime
    }

    /// `(uid, gid)` when the field carries them.
    #[must_use]
    pub const fn owner(&self) -> Option<(u16, u16)> {
        self.owner
    }

    /// Last modification time in UTC.
    #[must_use]
    pub fn mtime(&self) -> Option<OffsetDateTime> {
        unix_seconds_to_time(i64::from(self.mtime))
    }
}
