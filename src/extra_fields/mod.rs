//! Types for extra fields

use std::io::{self, Cursor};

use time::OffsetDateTime;
use tracing::{debug, trace};

use crate::unstable::LittleEndianReadExt;

mod extended_timestamp;
mod ntfs;
mod unix;
mod zip64_extended_information;

// re-export
pub use extended_timestamp::ExtendedTimestamp;
pub use ntfs::Ntfs;
pub use unix::InfoZipUnix;
pub(crate) use zip64_extended_information::Zip64ExtendedInformation;

/// contains one extra field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraField {
    /// NTFS extra field
    Ntfs(Ntfs),

    /// extended timestamp, as described in <https://libzip.org/specifications/extrafld.txt>
    ExtendedTimestamp(ExtendedTimestamp),

    /// Info-ZIP Unix (original) extra field
    InfoZipUnix(InfoZipUnix),
}

impl ExtraField {
    /// The modification time carried by this field, if any.
    pub fn modification_time(&self) -> Option<OffsetDateTime> {
        match self {
            ExtraField::Ntfs(ntfs) => ntfs.mtime(),
            ExtraField::ExtendedTimestamp(ts) => ts.mod_time_as_time(),
            ExtraField::InfoZipUnix(unix) => unix.mtime(),
        }
    }

    /// Lower ranks are preferred: NTFS carries 100ns ticks, the others whole seconds.
    fn precedence(&self) -> u8 {
        match self {
            ExtraField::Ntfs(_) => 0,
            ExtraField::ExtendedTimestamp(_) => 1,
            ExtraField::InfoZipUnix(_) => 2,
        }
    }
}

/// The most precise modification time among `fields`.
pub(crate) fn best_modification_time(fields: &[ExtraField]) -> Option<OffsetDateTime> {
    let mut ranked: Vec<&ExtraField> = fields.iter().collect();
    ranked.sort_by_key(|field| field.precedence());
    ranked.into_iter().find_map(ExtraField::modification_time)
}

/// Extra field used in this crate
#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum UsedExtraField {
    /// ZIP64 extended information extra field
    Zip64ExtendedInfo = 0x0001,
    /// NTFS
    Ntfs = 0x000a,
    /// extended timestamp
    /// from https://libzip.org/specifications/extrafld.txt
    ExtendedTimestamp = 0x5455,
    /// Info-ZIP UNIX (original, also OS/2, NT, etc)
    InfoZipUnix = 0x5855,
}

macro_rules! extra_field_match {
    ($x:expr, $( $variant:path ),+ $(,)?) => {
        match $x {
            $(
                v if v == $variant as u16 => Ok($variant),
            )+
            _ => Err(()),
        }
    };
}

impl TryFrom<u16> for UsedExtraField {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        extra_field_match!(
            value,
            UsedExtraField::Zip64ExtendedInfo,
            UsedExtraField::Ntfs,
            UsedExtraField::ExtendedTimestamp,
            UsedExtraField::InfoZipUnix,
        )
    }
}

/// Everything this crate takes from an extra data block.
#[derive(Debug, Clone, Default)]
pub(crate) struct ParsedExtraFields {
    pub(crate) zip64: Option<Zip64ExtendedInformation>,
    pub(crate) fields: Vec<ExtraField>,
}

/// Values from the fixed header that decide which ZIP64 fields are present.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Zip64Sentinels {
    pub(crate) uncompressed_size: bool,
    pub(crate) compressed_size: bool,
    pub(crate) header_start: bool,
}

/// Walk the `(id, length, body)` records in an extra data block.
///
/// A record that claims more bytes than remain ends the walk: the remainder is taken to be
/// padding or a field this crate does not know how to handle. Malformed timestamp fields are
/// dropped; only a malformed ZIP64 field is an error, since sizes and offsets depend on it.
pub(crate) fn parse_extra_fields(
    extra_field: &[u8],
    sentinels: Zip64Sentinels,
) -> io::Result<ParsedExtraFields> {
    let mut parsed = ParsedExtraFields::default();
    let mut reader = Cursor::new(extra_field);
    while (reader.position() as usize) < extra_field.len() {
        let (kind, len) = match (reader.read_u16_le(), reader.read_u16_le()) {
            (Ok(kind), Ok(len)) => (kind, len),
            _ => break,
        };
        let start = reader.position() as usize;
        let Some(body) = extra_field.get(start..start + len as usize) else {
            trace!(kind, len, "extra field overruns its block; ignoring the remainder");
            break;
        };
        reader.set_position((start + len as usize) as u64);

        match UsedExtraField::try_from(kind) {
            Ok(UsedExtraField::Zip64ExtendedInfo) => {
                parsed.zip64 = Some(Zip64ExtendedInformation::parse(body, sentinels)?);
            }
            Ok(UsedExtraField::Ntfs) => keep(
                &mut parsed.fields,
                Ntfs::try_from_reader(&mut &*body, len).map(ExtraField::Ntfs),
            ),
            Ok(UsedExtraField::ExtendedTimestamp) => keep(
                &mut parsed.fields,
                ExtendedTimestamp::try_from_reader(&mut &*body, len)
                    .map(ExtraField::ExtendedTimestamp),
            ),
            Ok(UsedExtraField::InfoZipUnix) => keep(
                &mut parsed.fields,
                InfoZipUnix::try_from_reader(&mut &*body, len).map(ExtraField::InfoZipUnix),
            ),
            Err(()) => {
                // Other fields are ignored
                trace!(kind, len, "skipping extra field");
            }
        }
    }
    Ok(parsed)
}

fn keep(fields: &mut Vec<ExtraField>, field: io::Result<ExtraField>) {
    match field {
        Ok(field) => fields.push(field),
        Err(e) => debug!("ignoring malformed extra field: {e}"),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const NO_SENTINELS: Zip64Sentinels = Zip64Sentinels {
        uncompressed_size: false,
        compressed_size: false,
        header_start: false,
    };

    fn field(kind: u16, body: &[u8]) -> Vec<u8> {
        let mut out = kind.to_le_bytes().to_vec();
        out.extend_from_slice(&(body.len() as u16).to_le_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn unknown_fields_are_skipped() {
        let mut block = field(0xcafe, &[]);
        block.extend(field(0x7875, &[1, 4, 0, 0, 0, 0, 4, 0, 0, 0, 0]));
        let parsed = parse_extra_fields(&block, NO_SENTINELS).unwrap();
        assert!(parsed.fields.is_empty());
        assert!(parsed.zip64.is_none());
    }

    #[test]
    fn truncated_trailing_field_is_tolerated() {
        let mut block = field(0x5455, &[1, 0x11, 0x4c, 0x33, 0x66]);
        block.extend_from_slice(&[0x55, 0x54, 0xff, 0x00, 1]);
        let parsed = parse_extra_fields(&block, NO_SENTINELS).unwrap();
        assert_eq!(parsed.fields.len(), 1);
    }

    #[test]
    fn malformed_timestamp_is_dropped() {
        // flags announce three times, but only one is present
        let block = field(0x5455, &[7, 0x11, 0x4c, 0x33, 0x66, 0]);
        let parsed = parse_extra_fields(&block, NO_SENTINELS).unwrap();
        assert!(parsed.fields.is_empty());
    }

    #[test]
    fn ntfs_time_wins_over_seconds() {
        let mut block = field(0x5455, &[1, 0x11, 0x4c, 0x33, 0x66]);
        let mut ntfs = vec![0, 0, 0, 0, 1, 0, 24, 0];
        let ticks = 116_444_736_000_000_000u64 + 1_714_635_025 * 10_000_000 + 1;
        ntfs.extend_from_slice(&ticks.to_le_bytes());
        ntfs.extend_from_slice(&ticks.to_le_bytes());
        ntfs.extend_from_slice(&ticks.to_le_bytes());
        block.extend(field(0x000a, &ntfs));
        let parsed = parse_extra_fields(&block, NO_SENTINELS).unwrap();
        let best = best_modification_time(&parsed.fields).unwrap();
        assert_eq!(best.unix_timestamp(), 1_714_635_025);
        assert_eq!(best.nanosecond(), 100);
    }
}
