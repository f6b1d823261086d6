/// Configuration shared by the container readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Treat per-entry errors (integrity, unsupported features, truncated file data) as
    /// terminal for the reader.
    pub strict: bool,

    /// Recompute CRC-32 for ZIP entries and compare with the recorded value.
    pub verify_checksums: bool,

    /// Deepest ISO 9660 directory nesting that will be expanded.
    pub max_directory_depth: usize,

    /// Largest file that will be materialized; bigger entries yield
    /// [`FsError::EntryTooLarge`](crate::result::FsError::EntryTooLarge).
    pub max_content_size: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strict: false,
            verify_checksums: true,
            max_directory_depth: 64,
            max_content_size: None,
        }
    }
}

impl Config {
    /// Set [`Config::strict`].
    #[must_use]
    pub const fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set [`Config::verify_checksums`].
    #[must_use]
    pub const fn verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Set [`Config::max_directory_depth`].
    #[must_use]
    pub const fn max_directory_depth(mut self, depth: usize) -> Self {
        self.max_directory_depth = depth;
        self
    }

    /// Set [`Config::max_content_size`].
    #[must_use]
    pub const fn max_content_size(mut self, limit: Option<u64>) -> Self {
        self.max_content_size = limit;
        self
    }
}
