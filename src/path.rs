//! Path manipulation utilities

use crate::entry::EntryPath;
use crate::result::{FsError, FsResult};

/// Split a stored ZIP name into path segments.
///
/// Both `/` and `\` separate segments. Empty and `.` segments are dropped, so leading
/// slashes and doubled separators collapse. A `..` segment could escape the extraction root
/// and is rejected.
pub(crate) fn zip_name_to_path(name: &str) -> FsResult<EntryPath> {
    let mut out = Vec::new();
    for segment in name.split(['/', '\\']) {
        match segment {
            "" | "." => (),
            ".." => {
                return Err(FsError::UnsafePath {
                    name: name.into(),
                });
            }
            segment => out.push(segment.to_owned()),
        }
    }
    Ok(EntryPath::from_segments(out))
}

/// Whether a stored ZIP name marks a directory entry.
pub(crate) fn is_dir_name(name: &str) -> bool {
    name.ends_with('/') || name.ends_with('\\')
}

/// Strip the `;version` suffix ISO 9660 appends to file identifiers. Nothing else about
/// the name changes, including a `.` left in front of the separator.
pub(crate) fn strip_iso_version(identifier: &str) -> &str {
    match identifier.rfind(';') {
        Some(pos) => &identifier[..pos],
        None => identifier,
    }
}
