//! Little-endian helpers for parsing variable-length fields.

use std::io::{self, Read};

/// Helper methods for reading little-endian integers.
pub(crate) trait LittleEndianReadExt: Read {
    fn read_u8(&mut self) -> io::Result<u8> {
        let mut out = [0u8; 1];
        self.read_exact(&mut out)?;
        Ok(out[0])
    }

    fn read_u16_le(&mut self) -> io::Result<u16> {
        let mut out = [0u8; 2];
        self.read_exact(&mut out)?;
        Ok(u16::from_le_bytes(out))
    }

    fn read_u32_le(&mut self) -> io::Result<u32> {
        let mut out = [0u8; 4];
        self.read_exact(&mut out)?;
        Ok(u32::from_le_bytes(out))
    }

    fn read_u64_le(&mut self) -> io::Result<u64> {
        let mut out = [0u8; 8];
        self.read_exact(&mut out)?;
        Ok(u64::from_le_bytes(out))
    }

    fn skip_exact(&mut self, len: usize) -> io::Result<()> {
        let skipped = io::copy(&mut Read::take(&mut *self, len as u64), &mut io::sink())?;
        if skipped == len as u64 {
            Ok(())
        } else {
            Err(io::ErrorKind::UnexpectedEof.into())
        }
    }
}

impl<R: Read + ?Sized> LittleEndianReadExt for R {}
