//! Pick a reader for a path or a byte source.

use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;

use displaydoc::Display;
use thiserror::Error;
use tracing::debug;

use crate::entry::{Entry, EntryStream};
use crate::read::{Config, DirWalker, IsoReader, ZipReader};
use crate::result::{FsError, FsResult};
use crate::source::{ByteSource, FileSource};
use crate::spec;

/// Offset of the first volume descriptor's standard identifier.
const ISO_IDENTIFIER_OFFSET: u64 = 16 * 2048 + 1;

/// The kinds of container this crate reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// A directory on the native filesystem.
    Dir,
    /// An ISO 9660 disc image.
    Iso,
    /// A ZIP archive.
    Zip,
}

/// unknown container format `{0}`, expected one of `dir`, `iso` or `zip`
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub struct ParseFormatError(String);

impl Format {
    /// Guess the format from a path: directories are [`Format::Dir`], `.iso` and `.bin`
    /// files are [`Format::Iso`], `.zip` files are [`Format::Zip`]. A trailing `.gz` is
    /// looked through, so `disc.iso.gz` is an image.
    pub fn from_path(path: &Path) -> Option<Self> {
        if path.is_dir() {
            return Some(Format::Dir);
        }
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        let name = name.strip_suffix(".gz").unwrap_or(&name);
        match Path::new(name).extension()?.to_str()? {
            "iso" | "bin" => Some(Format::Iso),
            "zip" => Some(Format::Zip),
            _ => None,
        }
    }

    /// Guess the format from the content of a source.
    ///
    /// Images are recognized by the `CD001` identifier of their first volume descriptor.
    /// Archives are recognized by a local header or empty-archive signature at the start,
    /// or failing that by an end of central directory record (as in self-extractors).
    pub fn sniff<S: ByteSource + ?Sized>(source: &S) -> io::Result<Option<Self>> {
        let mut identifier = [0u8; 5];
        if source.len() >= ISO_IDENTIFIER_OFFSET + identifier.len() as u64 {
            source.read_exact_at(ISO_IDENTIFIER_OFFSET, &mut identifier)?;
            if &identifier == b"CD001" {
                return Ok(Some(Format::Iso));
            }
        }

        let mut magic = [0u8; 4];
        if source.len() >= magic.len() as u64 {
            source.read_exact_at(0, &mut magic)?;
            let magic = u32::from_le_bytes(magic);
            if magic == spec::LOCAL_FILE_HEADER_SIGNATURE
                || magic == spec::CENTRAL_DIRECTORY_END_SIGNATURE
            {
                return Ok(Some(Format::Zip));
            }
        }
        match spec::find_central_directory(source) {
            Ok(_) => Ok(Some(Format::Zip)),
            Err(FsError::Io(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }

    /// Lower-case name, as accepted by [`FromStr`].
    pub const fn name(self) -> &'static str {
        match self {
            Format::Dir => "dir",
            Format::Iso => "iso",
            Format::Zip => "zip",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dir" | "directory" => Ok(Format::Dir),
            "iso" | "iso9660" => Ok(Format::Iso),
            "zip" => Ok(Format::Zip),
            _ => Err(ParseFormatError(s.to_owned())),
        }
    }
}

/// A reader for whichever format a container turned out to be.
#[derive(Debug)]
pub enum Container<S> {
    /// A live directory tree.
    Dir(DirWalker),
    /// An ISO 9660 image.
    Iso(IsoReader<S>),
    /// A ZIP archive.
    Zip(ZipReader<S>),
}

/// The source type [`Container::open`] reads from: a file, or a decompressed copy of one.
pub type DynSource = Box<dyn ByteSource + Send + Sync>;

impl<S: ByteSource> Container<S> {
    /// Open `source` as `format`.
    ///
    /// # Errors
    ///
    /// A live directory has no byte source, so [`Format::Dir`] fails with
    /// [`FsError::Unsupported`]. Otherwise, whatever the chosen reader's constructor reports.
    pub fn from_source(
        format: Format,
        label: impl Into<String>,
        source: S,
        config: Config,
    ) -> FsResult<Self> {
        let label: String = label.into();
        match format {
            Format::Iso => IsoReader::with_config(label, source, config).map(Container::Iso),
            Format::Zip => ZipReader::with_config(label, source, config).map(Container::Zip),
            Format::Dir => Err(FsError::Unsupported {
                path: label.into(),
                feature: "reading a live directory from a byte source".into(),
            }),
        }
    }

    /// The format being read.
    pub fn format(&self) -> Format {
        match self {
            Container::Dir(_) => Format::Dir,
            Container::Iso(_) => Format::Iso,
            Container::Zip(_) => Format::Zip,
        }
    }
}

impl Container<DynSource> {
    /// Open the container at `path`.
    ///
    /// Without an explicit `format`, the path is consulted first ([`Format::from_path`]) and
    /// then the content ([`Format::sniff`]). Files ending in `.gz` are decompressed into
    /// memory first.
    pub fn open(path: impl AsRef<Path>, format: Option<Format>, config: Config) -> FsResult<Self> {
        let path = path.as_ref();
        let format = format.or_else(|| Format::from_path(path));
        if format == Some(Format::Dir) {
            return DirWalker::with_config(path, config).map(Container::Dir);
        }

        let label = path.display().to_string();
        let source: DynSource = if is_gzip(path) {
            Box::new(gunzip(path)?)
        } else {
            Box::new(FileSource::open(path)?)
        };
        let format = match format {
            Some(format) => format,
            None => Format::sniff(&*source)?.ok_or_else(|| FsError::Unsupported {
                path: label.clone().into(),
                feature: "unrecognized container format".into(),
            })?,
        };
        debug!(path = %label, %format, "opening container");
        Self::from_source(format, label, source, config)
    }
}

impl<S: ByteSource> Iterator for Container<S> {
    type Item = FsResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Container::Dir(reader) => reader.next(),
            Container::Iso(reader) => reader.next(),
            Container::Zip(reader) => reader.next(),
        }
    }
}

impl<S: ByteSource> EntryStream for Container<S> {
    fn label(&self) -> &str {
        match self {
            Container::Dir(reader) => reader.label(),
            Container::Iso(reader) => reader.label(),
            Container::Zip(reader) => reader.label(),
        }
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

#[cfg(feature = "_deflate-any")]
fn gunzip(path: &Path) -> FsResult<Vec<u8>> {
    use std::fs::File;
    use std::io::{BufReader, Read};

    let mut content = Vec::new();
    flate2::read::MultiGzDecoder::new(BufReader::new(File::open(path)?))
        .read_to_end(&mut content)?;
    debug!(path = %path.display(), size = content.len(), "decompressed gzip input");
    Ok(content)
}

#[cfg(not(feature = "_deflate-any"))]
fn gunzip(path: &Path) -> FsResult<Vec<u8>> {
    Err(FsError::Unsupported {
        path: path.display().to_string().into(),
        feature: "gzip-compressed input (built without deflate support)".into(),
    })
}
