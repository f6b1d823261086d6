//! Walk a live directory tree as an entry stream.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::entry::{Entry, EntryPath, EntryStream};
use crate::read::{Config, Fuse, check_content_size};
use crate::result::{FsError, FsResult};

/// Yields the contents of a directory on the native filesystem.
///
/// Children are visited in file-name order, each directory before its children. The root
/// itself is not yielded. Symbolic links are not followed and are skipped, like every other
/// entry that is neither a file nor a directory.
#[derive(Debug)]
pub struct DirWalker {
    label: String,
    root: PathBuf,
    config: Config,
    walker: walkdir::IntoIter,
    fuse: Fuse,
}

impl DirWalker {
    /// Walk `root` with the default [`Config`].
    pub fn new(root: impl AsRef<Path>) -> FsResult<Self> {
        Self::with_config(root, Config::default())
    }

    /// Walk `root`, which must be a directory.
    pub fn with_config(root: impl AsRef<Path>, config: Config) -> FsResult<Self> {
        let root = root.as_ref().to_path_buf();
        if !fs::metadata(&root)?.is_dir() {
            return Err(FsError::Io(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", root.display()),
            )));
        }
        let walker = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        Ok(Self {
            label: root.display().to_string(),
            root,
            config,
            walker,
            fuse: Fuse::new(&config),
        })
    }

    /// The directory being walked.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn relative_path(&self, path: &Path) -> EntryPath {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        EntryPath::from_segments(
            relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy().into_owned()),
        )
    }

    fn read_entry(&self, dirent: &walkdir::DirEntry) -> FsResult<Option<Entry>> {
        let path = self.relative_path(dirent.path());
        let metadata = dirent.metadata().map_err(|source| FsError::Walk {
            path: dirent.path().display().to_string().into(),
            source,
        })?;
        let timestamp = metadata.modified().ok().map(OffsetDateTime::from);

        if metadata.is_dir() {
            Ok(Some(Entry::directory(path, timestamp)))
        } else if metadata.is_file() {
            check_content_size(&self.config, &path, metadata.len())?;
            let content = fs::read(dirent.path())?;
            Ok(Some(Entry::file(path, timestamp, content)))
        } else {
            trace!(path = %dirent.path().display(), "skipping special file");
            Ok(None)
        }
    }
}

impl Iterator for DirWalker {
    type Item = FsResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.fuse.is_blown() {
                return None;
            }
            let dirent = match self.walker.next()? {
                Ok(dirent) => dirent,
                Err(source) => {
                    let path = source
                        .path()
                        .unwrap_or(self.root.as_path())
                        .display()
                        .to_string()
                        .into();
                    return Some(self.fuse.settle(&self.label, FsError::Walk { path, source }));
                }
            };
            if dirent.depth() == 0 {
                continue;
            }
            match self.read_entry(&dirent) {
                Ok(Some(entry)) => return Some(Ok(entry)),
                Ok(None) => continue,
                Err(e) => {
                    debug!(path = %dirent.path().display(), "cannot read entry");
                    return Some(self.fuse.settle(&self.label, e));
                }
            }
        }
    }
}

impl EntryStream for DirWalker {
    fn label(&self) -> &str {
        &self.label
    }
}
