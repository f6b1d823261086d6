//! Shared entry point for `containerfs-cli`.
//!
//! `list` prints one line per entry; `extract` recreates the tree on disk. Both keep going
//! after an entry fails to read, report it on stderr, and exit with
//! [`ExitCode::EntryErrors`] at the end.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use containerfs::{Config, Container, Entry, EntryStream, Format, FsError};
use displaydoc::Display;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    /// The container could not be opened, or output could not be written.
    Failure = 1,
    /// The traversal finished, but some entries could not be read.
    EntryErrors = 2,
}

#[derive(Parser, Debug)]
#[command(version, about = "List and extract ISO 9660 images, ZIP archives and directories")]
pub struct Cli {
    /// Log more; repeat for even more
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Stop at the first entry that cannot be read
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print `path<TAB>timestamp<TAB>size` for every entry, with `DIR` for directories
    List {
        /// Image, archive or directory; `.gz` files are decompressed first
        input: PathBuf,
        /// Read the input as this format instead of guessing
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },
    /// Recreate the entries under a new directory
    Extract {
        /// Image, archive or directory; `.gz` files are decompressed first
        input: PathBuf,
        /// Output directory, which must not exist yet
        #[arg(short, long)]
        output: PathBuf,
        /// Read the input as this format instead of guessing
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum FormatArg {
    Dir,
    Iso,
    Zip,
}

impl From<FormatArg> for Format {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Dir => Format::Dir,
            FormatArg::Iso => Format::Iso,
            FormatArg::Zip => Format::Zip,
        }
    }
}

pub fn shared_main() -> ! {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    process::exit(run(cli) as i32)
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "containerfs=info,containerfs_cli=info",
        1 => "containerfs=debug,containerfs_cli=debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

pub fn run(cli: Cli) -> ExitCode {
    let config = Config::default().strict(cli.strict);
    let result = match cli.command {
        Command::List { input, format } => open(&input, format, config)
            .and_then(|container| list(container, &mut io::stdout().lock())),
        Command::Extract {
            input,
            output,
            format,
        } => open(&input, format, config).and_then(|container| extract(container, &output)),
    };
    match result {
        Ok(0) => ExitCode::Success,
        Ok(failed) => {
            warn!(failed, "some entries could not be read");
            ExitCode::EntryErrors
        }
        Err(e) => {
            error!("{e}");
            ExitCode::Failure
        }
    }
}

fn open(
    input: &Path,
    format: Option<FormatArg>,
    config: Config,
) -> Result<Container<containerfs::DynSource>, Error> {
    let container = Container::open(input, format.map(Format::from), config)?;
    debug!(input = %input.display(), format = %container.format(), "opened input");
    Ok(container)
}

/// Failures that end a run early.
#[derive(Debug, Display, Error)]
pub enum Error {
    /// {0}
    Container(#[from] FsError),
    /// cannot write output: {0}
    Output(#[from] io::Error),
}

/// Drive `stream`, handing every entry to `handle`. Returns how many entries failed.
fn for_each_entry<S, F>(stream: S, mut handle: F) -> Result<usize, Error>
where
    S: EntryStream,
    F: FnMut(Entry) -> io::Result<()>,
{
    let label = stream.label().to_owned();
    let mut failed = 0;
    for entry in stream {
        match entry {
            Ok(entry) => handle(entry)?,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                error!(container = %label, "{e}");
                failed += 1;
            }
        }
    }
    Ok(failed)
}

/// Format one entry the way `list` prints it.
pub fn listing_line(entry: &Entry) -> String {
    let timestamp = entry
        .timestamp
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| "-".to_owned());
    let size = match entry.size() {
        Some(size) => size.to_string(),
        None => "DIR".to_owned(),
    };
    format!("{}\t{timestamp}\t{size}", entry.path)
}

pub fn list<S: EntryStream>(stream: S, out: &mut impl Write) -> Result<usize, Error> {
    let failed = for_each_entry(stream, |entry| writeln!(out, "{}", listing_line(&entry)))?;
    out.flush()?;
    Ok(failed)
}

pub fn extract<S: EntryStream>(stream: S, output: &Path) -> Result<usize, Error> {
    if output.exists() {
        return Err(Error::Output(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", output.display()),
        )));
    }
    fs::create_dir_all(output)?;
    let mut written = 0usize;
    let failed = for_each_entry(stream, |entry| {
        let target = output.join(entry.path.to_path_buf());
        match entry.content {
            None => fs::create_dir_all(&target),
            Some(content) => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                written += 1;
                fs::write(&target, content)
            }
        }
    })?;
    info!(files = written, output = %output.display(), "extracted");
    Ok(failed)
}

#[cfg(test)]
mod test {
    use super::*;
    use containerfs::EntryPath;
    use time::OffsetDateTime;

    #[test]
    fn listing_lines() {
        let when = OffsetDateTime::from_unix_timestamp(1_714_635_025).unwrap();
        let file = Entry::file(EntryPath::from_segments(["a", "b.txt"]), Some(when), vec![0; 3]);
        assert_eq!(listing_line(&file), "a/b.txt\t2024-05-02T07:30:25Z\t3");
        let dir = Entry::directory(EntryPath::from_segments(["a"]), None);
        assert_eq!(listing_line(&dir), "a\t-\tDIR");
    }

    #[test]
    fn error_messages() {
        let missing = Error::from(FsError::NoCentralDirectory { searched: 22 });
        assert_eq!(
            missing.to_string(),
            "no end of central directory record found within 22 bytes of the end"
        );
        let denied = Error::from(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert!(matches!(denied, Error::Output(_)));
        assert_eq!(denied.to_string(), "cannot write output: denied");
    }

    #[test]
    fn extract_refuses_existing_output() {
        let input = tempfile::tempdir().unwrap();
        fs::write(input.path().join("x.txt"), b"x").unwrap();
        let output = tempfile::tempdir().unwrap();
        let walker = containerfs::DirWalker::new(input.path()).unwrap();
        assert!(matches!(extract(walker, output.path()), Err(Error::Output(_))));
    }

    #[test]
    fn extract_recreates_the_tree() {
        let input = tempfile::tempdir().unwrap();
        fs::create_dir(input.path().join("sub")).unwrap();
        fs::write(input.path().join("sub/x.txt"), b"x").unwrap();
        let output = tempfile::tempdir().unwrap();
        let target = output.path().join("out");

        let walker = containerfs::DirWalker::new(input.path()).unwrap();
        assert_eq!(extract(walker, &target).unwrap(), 0);
        assert_eq!(fs::read(target.join("sub/x.txt")).unwrap(), b"x");
    }
}
