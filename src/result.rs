#![allow(unknown_lints)] // non_local_definitions isn't in Rust 1.70
#![allow(non_local_definitions)]
//! Error types that can be emitted from this library

use std::borrow::Cow;
use std::io;

use displaydoc::Display;
use thiserror::Error;

/// Generic result type with FsError as its error variant
pub type FsResult<T> = Result<T, FsError>;

/// Broad classes of failure, used to decide whether a traversal can continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or missing mandatory records; the namespace cannot be trusted.
    Structural,
    /// A declared extent or length exceeds the available source bytes.
    Truncation,
    /// A checksum or size mismatch in one entry.
    Integrity,
    /// A feature this crate does not read (compression method, encryption, ...).
    Unsupported,
    /// The byte source itself failed.
    Io,
}

/// Error type for container readers
#[derive(Debug, Display, Error)]
#[non_exhaustive]
pub enum FsError {
    /// i/o error: {0}
    Io(#[from] io::Error),

    /// no primary volume descriptor found before sector {sector}
    NoPrimaryVolumeDescriptor {
        /// First sector that was not examined.
        sector: u64,
    },

    /// invalid ISO 9660 image at offset {offset}: {reason}
    InvalidImage {
        /// Byte offset of the offending structure.
        offset: u64,
        /// What was wrong with it.
        reason: Cow<'static, str>,
    },

    /// malformed directory record in `{path}` at offset {offset}: {reason}
    MalformedDirectoryRecord {
        /// Directory being expanded.
        path: Box<str>,
        /// Byte offset of the record.
        offset: u64,
        /// What was wrong with it.
        reason: Cow<'static, str>,
    },

    /// truncated image: `{path}` claims {length} bytes at offset {offset}, but the source holds only {available}
    TruncatedImage {
        /// Entry whose extent is out of range.
        path: Box<str>,
        /// Start of the extent.
        offset: u64,
        /// Declared length.
        length: u64,
        /// Source length.
        available: u64,
        /// Whether the extent backs a directory (and so the tree beneath it).
        directory: bool,
    },

    /// no end of central directory record found within {searched} bytes of the end
    NoCentralDirectory {
        /// Number of trailing bytes that were scanned.
        searched: u64,
    },

    /// malformed central directory at offset {offset}: {reason}
    MalformedCentralDirectory {
        /// Byte offset of the offending record.
        offset: u64,
        /// What was wrong with it.
        reason: Cow<'static, str>,
    },

    /// invalid ZIP archive: `{path}` at offset {offset}: {reason}
    InvalidArchive {
        /// Entry whose local header is inconsistent.
        path: Box<str>,
        /// Byte offset of the local header.
        offset: u64,
        /// What was wrong with it.
        reason: Cow<'static, str>,
    },

    /// truncated entry: `{path}` claims {length} bytes at offset {offset}, but the source holds only {available}
    TruncatedEntry {
        /// Entry whose payload is out of range.
        path: Box<str>,
        /// Start of the payload.
        offset: u64,
        /// Declared length.
        length: u64,
        /// Source length.
        available: u64,
    },

    /// unsupported compression method {method} for `{path}`
    UnsupportedCompressionMethod {
        /// Entry using the method.
        path: Box<str>,
        /// Raw method number.
        method: u16,
    },

    /// unsupported feature in `{path}`: {feature}
    Unsupported {
        /// Entry (or container) using the feature.
        path: Box<str>,
        /// Name of the feature.
        feature: Cow<'static, str>,
    },

    /// integrity check failed for `{path}`: {reason}
    Integrity {
        /// Entry that failed verification.
        path: Box<str>,
        /// What did not match.
        reason: Cow<'static, str>,
    },

    /// `{path}` holds {size} bytes, more than the configured limit of {limit}
    EntryTooLarge {
        /// Entry that was not materialized.
        path: Box<str>,
        /// Declared size.
        size: u64,
        /// Configured limit.
        limit: u64,
    },

    /// entry name `{name}` escapes the container root
    UnsafePath {
        /// Raw entry name.
        name: Box<str>,
    },

    /// error walking directory `{path}`: {source}
    Walk {
        /// Path that could not be visited.
        path: Box<str>,
        /// Underlying walker error.
        source: walkdir::Error,
    },
}

impl FsError {
    /// Classify this error according to how much of a traversal it invalidates.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FsError::Io(_) | FsError::Walk { .. } => ErrorKind::Io,
            FsError::NoPrimaryVolumeDescriptor { .. }
            | FsError::InvalidImage { .. }
            | FsError::MalformedDirectoryRecord { .. }
            | FsError::NoCentralDirectory { .. }
            | FsError::MalformedCentralDirectory { .. }
            | FsError::InvalidArchive { .. } => ErrorKind::Structural,
            FsError::TruncatedImage { .. } | FsError::TruncatedEntry { .. } => {
                ErrorKind::Truncation
            }
            FsError::Integrity { .. } => ErrorKind::Integrity,
            FsError::UnsupportedCompressionMethod { .. }
            | FsError::Unsupported { .. }
            | FsError::EntryTooLarge { .. }
            | FsError::UnsafePath { .. } => ErrorKind::Unsupported,
        }
    }

    /// Whether a reader must stop after reporting this error.
    ///
    /// Truncation is only fatal when it takes a directory extent with it; a single file's
    /// missing bytes leave the rest of the namespace intact.
    pub fn is_fatal(&self) -> bool {
        match self {
            FsError::TruncatedImage { directory, .. } => *directory,
            FsError::Walk { .. } => false,
            _ => matches!(self.kind(), ErrorKind::Structural | ErrorKind::Io),
        }
    }
}

pub(crate) fn malformed_record<T, M: Into<Cow<'static, str>>>(
    path: &impl ToString,
    offset: u64,
    reason: M,
) -> FsResult<T> {
    Err(FsError::MalformedDirectoryRecord {
        path: path.to_string().into(),
        offset,
        reason: reason.into(),
    })
}

pub(crate) fn malformed_central<T, M: Into<Cow<'static, str>>>(
    offset: u64,
    reason: M,
) -> FsResult<T> {
    Err(FsError::MalformedCentralDirectory {
        offset,
        reason: reason.into(),
    })
}

impl From<FsError> for io::Error {
    fn from(err: FsError) -> io::Error {
        let kind = match &err {
            FsError::Io(err) => err.kind(),
            FsError::Walk { source, .. } => source
                .io_error()
                .map(io::Error::kind)
                .unwrap_or(io::ErrorKind::Other),
            other => match other.kind() {
                ErrorKind::Structural | ErrorKind::Integrity => io::ErrorKind::InvalidData,
                ErrorKind::Truncation => io::ErrorKind::UnexpectedEof,
                ErrorKind::Unsupported => io::ErrorKind::Unsupported,
                ErrorKind::Io => io::ErrorKind::Other,
            },
        };

        io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn truncation_fatality_follows_the_extent_kind() {
        let file = FsError::TruncatedImage {
            path: "A.TXT".into(),
            offset: 40960,
            length: 10,
            available: 40960,
            directory: false,
        };
        assert_eq!(file.kind(), ErrorKind::Truncation);
        assert!(!file.is_fatal());

        let dir = FsError::TruncatedImage {
            path: "DOCS".into(),
            offset: 40960,
            length: 2048,
            available: 40960,
            directory: true,
        };
        assert!(dir.is_fatal());
    }

    #[test]
    fn display_carries_location() {
        let err = FsError::UnsupportedCompressionMethod {
            path: "a/b.bin".into(),
            method: 14,
        };
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "unsupported compression method 14 for `a/b.bin`"
        );

        let err = FsError::MalformedCentralDirectory {
            offset: 120,
            reason: "bad signature".into(),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("120"));
    }

    #[test]
    fn converts_into_io_error() {
        let err: io::Error = FsError::Integrity {
            path: "x".into(),
            reason: "CRC-32 mismatch".into(),
        }
        .into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
