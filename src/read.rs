//! Types for reading containers

use tracing::{debug, warn};

use crate::entry::{Entry, EntryPath};
use crate::result::{FsError, FsResult};

mod config;

pub use config::*;

pub mod dir;
pub mod iso;
pub(crate) mod magic_finder;
pub mod zip;

pub use dir::DirWalker;
pub use iso::{IsoReader, VolumeInfo};
pub use zip::ZipReader;

/// Tracks whether a reader may yield further items.
///
/// Every reader reports errors through [`Fuse::settle`], which ends the stream after a fatal
/// error, or after any error once [`Config::strict`] is set.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fuse {
    strict: bool,
    blown: bool,
}

impl Fuse {
    pub(crate) const fn new(config: &Config) -> Self {
        Self {
            strict: config.strict,
            blown: false,
        }
    }

    pub(crate) const fn is_blown(&self) -> bool {
        self.blown
    }

    pub(crate) fn settle(&mut self, label: &str, err: FsError) -> FsResult<Entry> {
        if err.is_fatal() {
            warn!(container = label, "stopping traversal: {err}");
            self.blown = true;
        } else if self.strict {
            debug!(container = label, "strict mode, stopping traversal: {err}");
            self.blown = true;
        } else {
            debug!(container = label, "skipping entry: {err}");
        }
        Err(err)
    }
}

/// Refuse to materialize entries beyond the configured size limit.
pub(crate) fn check_content_size(config: &Config, path: &EntryPath, size: u64) -> FsResult<()> {
    match config.max_content_size {
        Some(limit) if size > limit => Err(FsError::EntryTooLarge {
            path: path.to_string().into(),
            size,
            limit,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn per_entry_errors_only_stop_strict_readers() {
        let integrity = || FsError::Integrity {
            path: "a".into(),
            reason: "crc".into(),
        };

        let mut lenient = Fuse::new(&Config::default());
        assert!(lenient.settle("x", integrity()).is_err());
        assert!(!lenient.is_blown());

        let mut strict = Fuse::new(&Config::default().strict(true));
        assert!(strict.settle("x", integrity()).is_err());
        assert!(strict.is_blown());
    }

    #[test]
    fn fatal_errors_stop_every_reader() {
        let mut fuse = Fuse::new(&Config::default());
        assert!(fuse.settle("x", FsError::NoCentralDirectory { searched: 0 }).is_err());
        assert!(fuse.is_blown());
    }

    #[test]
    fn size_limit() {
        let path = EntryPath::from_segments(["big"]);
        let config = Config::default().max_content_size(Some(10));
        assert!(check_content_size(&config, &path, 10).is_ok());
        assert!(matches!(
            check_content_size(&config, &path, 11),
            Err(FsError::EntryTooLarge { size: 11, limit: 10, .. })
        ));
        assert!(check_content_size(&Config::default(), &path, u64::MAX).is_ok());
    }
}
