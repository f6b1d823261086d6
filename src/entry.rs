//! The uniform value produced by every container reader.

use std::fmt;
use std::path::PathBuf;

use time::OffsetDateTime;

use crate::result::FsResult;

/// The logical location of an entry: an ordered list of slash-free segments from the
/// container root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryPath {
    segments: Vec<String>,
}

impl EntryPath {
    /// The container root (no segments). Never yielded as an entry itself.
    pub const fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Build a path from already-validated segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// The segments from root to this entry.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether this is the root path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The final segment, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The enclosing directory; the root has no parent.
    pub fn parent(&self) -> Option<EntryPath> {
        let (_, init) = self.segments.split_last()?;
        Some(Self {
            segments: init.to_vec(),
        })
    }

    /// A child of this path.
    pub fn join(&self, name: impl Into<String>) -> EntryPath {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend_from_slice(&self.segments);
        segments.push(name.into());
        Self { segments }
    }

    /// Every proper, non-root prefix of this path, shortest first.
    pub fn ancestors(&self) -> impl Iterator<Item = EntryPath> + '_ {
        (1..self.segments.len()).map(|n| Self {
            segments: self.segments[..n].to_vec(),
        })
    }

    /// Whether `self` is a proper prefix of `other`.
    pub fn is_ancestor_of(&self, other: &EntryPath) -> bool {
        self.segments.len() < other.segments.len() && other.segments.starts_with(&self.segments)
    }

    /// A relative native path with one component per segment.
    pub fn to_path_buf(&self) -> PathBuf {
        self.segments.iter().collect()
    }
}

impl fmt::Display for EntryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

/// One file or directory yielded by an [`EntryStream`].
///
/// An entry owns its path and content, so it outlives the reader that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Location within the container.
    pub path: EntryPath,
    /// Last modification time, when the container records a representable one.
    pub timestamp: Option<OffsetDateTime>,
    /// File bytes, or `None` for a directory.
    pub content: Option<Vec<u8>>,
}

impl Entry {
    /// A directory entry.
    pub fn directory(path: EntryPath, timestamp: Option<OffsetDateTime>) -> Self {
        Self {
            path,
            timestamp,
            content: None,
        }
    }

    /// A file entry with fully materialized content.
    pub fn file(path: EntryPath, timestamp: Option<OffsetDateTime>, content: Vec<u8>) -> Self {
        Self {
            path,
            timestamp,
            content: Some(content),
        }
    }

    /// Whether this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.content.is_none()
    }

    /// Whether this entry is a file.
    pub fn is_file(&self) -> bool {
        self.content.is_some()
    }

    /// Content length for files.
    pub fn size(&self) -> Option<u64> {
        self.content.as_ref().map(|c| c.len() as u64)
    }

    /// The `(path, timestamp, content)` tuple.
    pub fn into_parts(self) -> (EntryPath, Option<OffsetDateTime>, Option<Vec<u8>>) {
        (self.path, self.timestamp, self.content)
    }
}

/// A finite, non-restartable, deterministic sequence of entries.
///
/// Each item is either the next entry or an error. Errors for which
/// [`FsError::is_fatal`](crate::result::FsError::is_fatal) holds end the stream; other
/// errors describe a single entry and the stream continues after them. Construct a fresh
/// reader to traverse again.
pub trait EntryStream: Iterator<Item = FsResult<Entry>> {
    /// The display-only label the reader was constructed with.
    fn label(&self) -> &str;
}
