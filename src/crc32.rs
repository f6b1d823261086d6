//! Helper module to compute a CRC32 checksum

use std::io;
use std::io::prelude::*;

use crc32fast::Hasher;

/// Reader that hashes everything passing through it.
///
/// The checksum is only meaningful once the inner reader reports EOF; callers compare it
/// against the stored value themselves so a mismatch can be reported per entry.
pub(crate) struct Crc32Reader<R> {
    inner: R,
    hasher: Hasher,
    count: u64,
}

impl<R> Crc32Reader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Crc32Reader {
            inner,
            hasher: Hasher::new(),
            count: 0,
        }
    }

    /// CRC-32 of the bytes read so far.
    pub(crate) fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Number of bytes read so far.
    pub(crate) fn count(&self) -> u64 {
        self.count
    }
}

impl<R: Read> Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.inner.read(buf)?;
        self.hasher.update(&buf[..count]);
        self.count += count as u64;
        Ok(count)
    }
}
