//! Read ISO 9660 images as an entry stream.

use std::collections::HashSet;
use std::mem;
use std::vec;

use tracing::{debug, trace, warn};

use crate::entry::{Entry, EntryPath, EntryStream};
use crate::read::{Config, Fuse, check_content_size};
use crate::result::{FsError, FsResult, malformed_record};
use crate::source::{ByteSource, in_bounds};

mod datetime;
mod record;
mod volume;

use record::DirectoryRecord;
use volume::SECTOR_SIZE;
pub use volume::VolumeInfo;

/// A child of a directory, ready to be emitted.
#[derive(Debug, Clone)]
enum Node {
    Directory(DirectoryRecord),
    /// The extents of one file, in record order.
    File(Vec<DirectoryRecord>),
}

/// A directory on the traversal stack. Its records are read when it reaches the top.
#[derive(Debug)]
struct Frame {
    path: EntryPath,
    record: DirectoryRecord,
    children: Option<vec::IntoIter<Node>>,
}

/// Reads an ISO 9660 image from a [`ByteSource`].
///
/// The volume descriptor set is read when the reader is created. Iteration then walks the
/// directory tree in pre-order: each directory is yielded before its children, and children
/// keep the order of their records. The walk uses an explicit stack; directory extents that
/// were already expanded, or nesting deeper than [`Config::max_directory_depth`], end it with
/// [`FsError::MalformedDirectoryRecord`].
///
/// ```no_run
/// use containerfs::{FileSource, IsoReader};
///
/// let source = FileSource::open("disc.iso")?;
/// let reader = IsoReader::new("disc.iso", source)?;
/// println!("volume {}", reader.volume().volume_identifier);
/// for entry in reader {
///     let entry = entry?;
///     println!("{} {:?}", entry.path, entry.size());
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct IsoReader<S> {
    label: String,
    source: S,
    config: Config,
    volume: VolumeInfo,
    stack: Vec<Frame>,
    visited: HashSet<u32>,
    fuse: Fuse,
}

impl<S: ByteSource> IsoReader<S> {
    /// Open an image with the default [`Config`].
    ///
    /// `label` only names the image in logs and errors.
    pub fn new(label: impl Into<String>, source: S) -> FsResult<Self> {
        Self::with_config(label, source, Config::default())
    }

    /// Open an image, reading its volume descriptor set.
    ///
    /// # Errors
    ///
    /// Fails with [`FsError::NoPrimaryVolumeDescriptor`] when the descriptor set (starting
    /// at sector 16) ends or the source runs out before a primary volume descriptor, and with
    /// [`FsError::InvalidImage`] when that descriptor is unusable.
    pub fn with_config(label: impl Into<String>, source: S, config: Config) -> FsResult<Self> {
        let label = label.into();
        let primary = volume::find_primary_volume(&source)?;
        debug!(
            container = %label,
            volume = %primary.info.volume_identifier,
            "opened ISO 9660 image"
        );

        let mut visited = HashSet::new();
        visited.insert(primary.root.extent);
        Ok(Self {
            label,
            source,
            config,
            volume: primary.info,
            stack: vec![Frame {
                path: EntryPath::root(),
                record: primary.root,
                children: None,
            }],
            visited,
            fuse: Fuse::new(&config),
        })
    }

    /// Information from the primary volume descriptor.
    pub fn volume(&self) -> &VolumeInfo {
        &self.volume
    }

    /// Unwrap and return the inner source.
    pub fn into_inner(self) -> S {
        self.source
    }

    /// Read a directory's extent and group its records into children.
    fn read_directory(&self, path: &EntryPath, directory: &DirectoryRecord) -> FsResult<Vec<Node>> {
        let start = directory.data_start(SECTOR_SIZE);
        let data_length = u64::from(directory.data_length);
        let extent_length = data_length.div_ceil(SECTOR_SIZE) * SECTOR_SIZE;
        if !in_bounds(self.source.len(), start, extent_length) {
            return Err(FsError::TruncatedImage {
                path: display(path).into(),
                offset: start,
                length: extent_length,
                available: self.source.len(),
                directory: true,
            });
        }
        let buffer = self.source.read_vec_at(start, extent_length as usize)?;
        let records = parse_records(&buffer[..data_length as usize], path, start)?;
        group_records(records, path, start)
    }

    /// Yield one child of the directory on top of the stack.
    fn visit(&mut self, parent: &EntryPath, node: Node) -> FsResult<Entry> {
        match node {
            Node::Directory(record) => {
                let path = parent.join(record.name());
                if path.depth() > self.config.max_directory_depth {
                    return malformed_record(
                        &path,
                        record.data_start(SECTOR_SIZE),
                        format!(
                            "directory nesting exceeds {} levels",
                            self.config.max_directory_depth
                        ),
                    );
                }
                if !self.visited.insert(record.extent) {
                    return malformed_record(
                        &path,
                        record.data_start(SECTOR_SIZE),
                        "directory extent was already visited",
                    );
                }
                let entry = Entry::directory(path.clone(), record.recorded);
                self.stack.push(Frame {
                    path,
                    record,
                    children: None,
                });
                Ok(entry)
            }
            Node::File(extents) => {
                let path = parent.join(extents[0].name());
                self.read_file(path, &extents)
            }
        }
    }

    /// Concatenate the extents of a file.
    fn read_file(&self, path: EntryPath, extents: &[DirectoryRecord]) -> FsResult<Entry> {
        let size: u64 = extents
            .iter()
            .map(|record| u64::from(record.data_length))
            .sum();
        check_content_size(&self.config, &path, size)?;
        for record in extents {
            let start = record.data_start(SECTOR_SIZE);
            let length = u64::from(record.data_length);
            if !in_bounds(self.source.len(), start, length) {
                return Err(FsError::TruncatedImage {
                    path: path.to_string().into(),
                    offset: start,
                    length,
                    available: self.source.len(),
                    directory: false,
                });
            }
        }

        let mut content = vec![0; size as usize];
        let mut filled = 0;
        for record in extents {
            let length = record.data_length as usize;
            self.source.read_exact_at(
                record.data_start(SECTOR_SIZE),
                &mut content[filled..filled + length],
            )?;
            filled += length;
        }
        if extents.len() > 1 {
            trace!(path = %path, extents = extents.len(), size, "joined multi-extent file");
        }

        let timestamp = extents[0].recorded;
        Ok(Entry::file(path, timestamp, content))
    }
}

impl<S: ByteSource> Iterator for IsoReader<S> {
    type Item = FsResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.fuse.is_blown() {
                return None;
            }
            let frame = self.stack.last_mut()?;
            let Some(children) = frame.children.as_mut() else {
                let (path, record) = (frame.path.clone(), frame.record.clone());
                match self.read_directory(&path, &record) {
                    Ok(nodes) => {
                        trace!(path = %display(&path), children = nodes.len(), "expanded directory");
                        if let Some(frame) = self.stack.last_mut() {
                            frame.children = Some(nodes.into_iter());
                        }
                        continue;
                    }
                    Err(e) => {
                        self.stack.pop();
                        return Some(self.fuse.settle(&self.label, e));
                    }
                }
            };
            let Some(node) = children.next() else {
                self.stack.pop();
                continue;
            };
            let parent = frame.path.clone();
            return Some(match self.visit(&parent, node) {
                Ok(entry) => Ok(entry),
                Err(e) => self.fuse.settle(&self.label, e),
            });
        }
    }
}

impl<S: ByteSource> EntryStream for IsoReader<S> {
    fn label(&self) -> &str {
        &self.label
    }
}

fn display(path: &EntryPath) -> String {
    if path.is_root() {
        "/".to_owned()
    } else {
        path.to_string()
    }
}

/// Split a directory extent into records, skipping the zero padding at sector ends.
fn parse_records(extent: &[u8], path: &EntryPath, start: u64) -> FsResult<Vec<DirectoryRecord>> {
    let sector_size = SECTOR_SIZE as usize;
    let mut records = Vec::new();
    let mut position = 0;
    while position < extent.len() {
        let offset = start + position as u64;
        let length = extent[position] as usize;
        if length == 0 {
            if position == 0 {
                return malformed_record(
                    &display(path),
                    offset,
                    "directory does not begin with a record",
                );
            }
            // Records never span sectors; resume at the next one.
            position = (position / sector_size + 1) * sector_size;
            continue;
        }
        if position + length > extent.len() {
            return malformed_record(
                &display(path),
                offset,
                format!("record of {length} bytes overruns the directory extent"),
            );
        }
        if position % sector_size + length > sector_size {
            return malformed_record(
                &display(path),
                offset,
                "record crosses a sector boundary",
            );
        }
        let record = DirectoryRecord::parse(&extent[position..position + length])
            .map_err(|reason| FsError::MalformedDirectoryRecord {
                path: display(path).into(),
                offset,
                reason,
            })?;
        position += record.length as usize;
        records.push(record);
    }
    Ok(records)
}

/// Turn the records of one directory into its children.
///
/// Multi-extent records are collected until the final extent of the same name. Associated
/// files are skipped, and so are records whose name repeats an earlier sibling.
fn group_records(
    records: Vec<DirectoryRecord>,
    path: &EntryPath,
    start: u64,
) -> FsResult<Vec<Node>> {
    let mut nodes = Vec::new();
    let mut names = HashSet::new();
    let mut fragments: Vec<DirectoryRecord> = Vec::new();

    for record in records {
        if record.is_self_or_parent() {
            continue;
        }
        if let Some(first) = fragments.first() {
            if first.identifier != record.identifier || record.is_dir() {
                return malformed_record(
                    &display(path),
                    start,
                    format!(
                        "multi-extent file `{}` is interrupted by `{}`",
                        first.name(),
                        record.name()
                    ),
                );
            }
        }
        if record.is_associated() {
            trace!(name = %record.name(), "skipping associated file");
            continue;
        }

        let name = record.name();
        if record.is_dir() || !record.is_multi_extent() {
            if matches!(name.as_str(), "" | "." | "..") || name.contains('/') {
                warn!(directory = %display(path), name = %name, "skipping record with an unusable name");
                fragments.clear();
                continue;
            }
            if !names.insert(name) {
                warn!(
                    directory = %display(path),
                    name = %record.name(),
                    "duplicate name, keeping the first"
                );
                fragments.clear();
                continue;
            }
        }

        if record.is_dir() {
            nodes.push(Node::Directory(record));
        } else if record.is_multi_extent() {
            fragments.push(record);
        } else {
            fragments.push(record);
            nodes.push(Node::File(mem::take(&mut fragments)));
        }
    }

    if let Some(first) = fragments.first() {
        return malformed_record(
            &display(path),
            start,
            format!("multi-extent file `{}` has no final extent", first.name()),
        );
    }
    Ok(nodes)
}
