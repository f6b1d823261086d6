//! Possible ZIP compression methods.

use std::fmt;
use std::io::{self, Read};

#[cfg(feature = "_deflate-any")]
use flate2::read::DeflateDecoder;

/// Identifies the storage format used to compress a file within a ZIP archive.
///
/// Only the methods this crate can decode have a named variant; every other method number is
/// carried in [`CompressionMethod::Unsupported`] so the entry can be reported by name.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[non_exhaustive]
pub enum CompressionMethod {
    /// Store the file as is
    Stored,
    /// Compress the file using Deflate
    Deflated,
    /// Any other method number
    Unsupported(u16),
}

impl CompressionMethod {
    pub(crate) const STORE: u16 = 0;
    pub(crate) const DEFLATE: u16 = 8;

    /// Converts a u16 to its corresponding CompressionMethod
    pub const fn parse_from_u16(val: u16) -> Self {
        match val {
            Self::STORE => CompressionMethod::Stored,
            Self::DEFLATE => CompressionMethod::Deflated,
            v => CompressionMethod::Unsupported(v),
        }
    }

    /// Converts a CompressionMethod to a u16
    pub const fn serialize_to_u16(self) -> u16 {
        match self {
            CompressionMethod::Stored => Self::STORE,
            CompressionMethod::Deflated => Self::DEFLATE,
            CompressionMethod::Unsupported(v) => v,
        }
    }

    /// Whether this build can decode the method.
    pub const fn is_supported(self) -> bool {
        match self {
            CompressionMethod::Stored => true,
            CompressionMethod::Deflated => cfg!(feature = "_deflate-any"),
            CompressionMethod::Unsupported(_) => false,
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionMethod::Stored => write!(f, "stored"),
            CompressionMethod::Deflated => write!(f, "deflate"),
            CompressionMethod::Unsupported(v) => write!(f, "method {v}"),
        }
    }
}

/// A reader yielding the decoded bytes of one entry.
pub(crate) enum Decompressor<R> {
    Stored(R),
    #[cfg(feature = "_deflate-any")]
    Deflated(DeflateDecoder<R>),
}

impl<R: Read> Decompressor<R> {
    /// Returns `None` when the method cannot be decoded by this build.
    pub(crate) fn new(method: CompressionMethod, reader: R) -> Option<Self> {
        match method {
            CompressionMethod::Stored => Some(Decompressor::Stored(reader)),
            #[cfg(feature = "_deflate-any")]
            CompressionMethod::Deflated => Some(Decompressor::Deflated(DeflateDecoder::new(reader))),
            _ => None,
        }
    }
}

impl<R: Read> Read for Decompressor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Decompressor::Stored(r) => r.read(buf),
            #[cfg(feature = "_deflate-any")]
            Decompressor::Deflated(r) => r.read(buf),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn from_eq_to() {
        for v in 0..(u16::MAX as u32 + 1) {
            let from = CompressionMethod::parse_from_u16(v as u16);
            let to = from.serialize_to_u16() as u32;
            assert_eq!(v, to);
        }
    }

    #[test]
    fn unknown_methods_are_not_decoded() {
        let method = CompressionMethod::parse_from_u16(12);
        assert_eq!(method, CompressionMethod::Unsupported(12));
        assert!(!method.is_supported());
        assert!(Decompressor::new(method, &b""[..]).is_none());
    }

    #[cfg(feature = "_deflate-any")]
    #[test]
    fn inflates() {
        use flate2::{Compression, write::DeflateEncoder};
        use std::io::Write;

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"hello hello hello").unwrap();
        let compressed = encoder.finish().unwrap();

        let mut out = Vec::new();
        Decompressor::new(CompressionMethod::Deflated, compressed.as_slice())
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"hello hello hello");
    }
}
