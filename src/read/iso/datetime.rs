//! Date/time parsing
//!
//! ISO 9660 has two date formats: a 7-byte binary one in directory records and a 17-byte
//! ASCII one in volume descriptors. Both end with the offset from GMT in 15-minute units.

use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};
use tracing::trace;

use crate::types::offset_from_quarter_hours;

/// Offsets outside this range are invalid and read as GMT.
const OFFSET_RANGE: std::ops::RangeInclusive<i8> = -48..=52;

fn offset(quarter_hours: i8) -> UtcOffset {
    if OFFSET_RANGE.contains(&quarter_hours) {
        offset_from_quarter_hours(quarter_hours).unwrap_or(UtcOffset::UTC)
    } else {
        trace!(quarter_hours, "ignoring out of range GMT offset");
        UtcOffset::UTC
    }
}

fn assemble(
    year: i32,
    month: u8,
    day: u8,
    (hour, minute, second, nanosecond): (u8, u8, u8, u32),
    quarter_hours: i8,
) -> Option<OffsetDateTime> {
    let date = Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()?;
    let time = Time::from_hms_nano(hour, minute, second, nanosecond).ok()?;
    Some(
        PrimitiveDateTime::new(date, time)
            .assume_offset(offset(quarter_hours))
            .to_offset(UtcOffset::UTC),
    )
}

/// Decode the recording date of a directory record, normalized to UTC.
///
/// An all-zero field means "not specified".
pub(crate) fn decode_record_datetime(bytes: &[u8; 7]) -> Option<OffsetDateTime> {
    if bytes.iter().all(|&b| b == 0) {
        return None;
    }
    let [year, month, day, hour, minute, second, gmt_offset] = *bytes;
    assemble(
        1900 + i32::from(year),
        month,
        day,
        (hour, minute, second, 0),
        gmt_offset as i8,
    )
}

/// Decode a volume descriptor date (`YYYYMMDDHHMMSScc` digits plus the offset byte),
/// normalized to UTC.
///
/// Digits that are all zero (or blank) mean "not specified".
pub(crate) fn decode_volume_datetime(bytes: &[u8; 17]) -> Option<OffsetDateTime> {
    let digits = &bytes[..16];
    if digits.iter().all(|&b| b == b'0' || b == b' ' || b == 0) {
        return None;
    }
    let number = |range: std::ops::Range<usize>| -> Option<u32> {
        std::str::from_utf8(&digits[range]).ok()?.parse().ok()
    };
    let hundredths = number(14..16)?;
    assemble(
        number(0..4)? as i32,
        number(4..6)? as u8,
        number(6..8)? as u8,
        (
            number(8..10)? as u8,
            number(10..12)? as u8,
            number(12..14)? as u8,
            hundredths * 10_000_000,
        ),
        bytes[16] as i8,
    )
}
