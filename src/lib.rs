//! A library for reading containers of files as one stream of entries.
//!
//! Three kinds of container are supported:
//!
//! * ISO 9660 disc images, through [`IsoReader`]
//! * ZIP archives, through [`ZipReader`]
//! * directory trees on the native filesystem, through [`DirWalker`]
//!
//! Each reader is an [`Iterator`] of [`FsResult<Entry>`]. Directories come before their
//! contents, every entry carries a normalized [`EntryPath`] and an optional timestamp, and
//! files carry their complete, decompressed content. A damaged entry yields an error and the
//! stream moves on to the next one; a damaged container ends the stream (see
//! [`FsError::is_fatal`]).
//!
//! Images and archives are read from a [`ByteSource`], a random-access byte store such as a
//! `Vec<u8>` or a [`FileSource`]. [`Container::open`] picks the right reader for a path.
//!
//! ```no_run
//! use containerfs::{Config, Container};
//!
//! fn list(path: &str) -> containerfs::FsResult<()> {
//!     for entry in Container::open(path, None, Config::default())? {
//!         let entry = entry?;
//!         println!("{} {:?}", entry.path, entry.size());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! The default `deflate` feature decodes deflated ZIP entries and gzip-compressed inputs.
//! Without it, such entries are reported as
//! [`FsError::UnsupportedCompressionMethod`].
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod compression;
pub mod container;
mod cp437;
mod crc32;
pub mod entry;
pub mod extra_fields;
mod path;
pub mod read;
pub mod result;
pub mod source;
mod spec;
pub mod types;
mod unstable;

pub use crate::compression::CompressionMethod;
pub use crate::container::{Container, DynSource, Format, ParseFormatError};
pub use crate::entry::{Entry, EntryPath, EntryStream};
pub use crate::read::dir::DirWalker;
pub use crate::read::iso::{IsoReader, VolumeInfo};
pub use crate::read::zip::ZipReader;
pub use crate::read::Config;
pub use crate::result::{ErrorKind, FsError, FsResult};
pub use crate::source::{ByteSource, FileSource};
pub use crate::types::DateTime;
