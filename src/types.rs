#![allow(clippy::wrong_self_convention)]

//! Timestamp types shared by the readers.
use std::fmt;

use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

pub(crate) mod ffi {
    pub const S_IFMT: u32 = 0o0170000;
    pub const S_IFDIR: u32 = 0o0040000;
}

/// MS-DOS "directory" attribute in the low byte of ZIP external attributes.
pub(crate) const DOS_DIRECTORY_ATTRIBUTE: u32 = 0x10;

/// Error type for time parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimeRangeError;

impl fmt::Display for DateTimeRangeError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "a recorded date could not be represented as a calendar time")
    }
}

impl std::error::Error for DateTimeRangeError {}

impl From<time::error::ComponentRange> for DateTimeRangeError {
    fn from(_value: time::error::ComponentRange) -> Self {
        DateTimeRangeError
    }
}

/// Representation of a moment in time.
///
/// Zip files use an old format from DOS to store timestamps,
/// with its own set of peculiarities.
/// For example, it has a resolution of 2 seconds!
///
/// # Warning
///
/// Because there is no timezone associated with the [`DateTime`], [`DateTime::to_time`]
/// interprets it as UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
}

impl Default for DateTime {
    /// Constructs an 'default' datetime of 1980-01-01 00:00:00
    fn default() -> DateTime {
        DateTime {
            year: 1980,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
        }
    }
}

impl DateTime {
    /// Converts an msdos (u16, u16) pair to a DateTime object, without validating it
    pub const fn from_msdos_unchecked(datepart: u16, timepart: u16) -> DateTime {
        let seconds = (timepart & 0b0000000000011111) << 1;
        let minutes = (timepart & 0b0000011111100000) >> 5;
        let hours = (timepart & 0b1111100000000000) >> 11;
        let days = datepart & 0b0000000000011111;
        let months = (datepart & 0b0000000111100000) >> 5;
        let years = (datepart & 0b1111111000000000) >> 9;

        DateTime {
            year: years + 1980,
            month: months as u8,
            day: days as u8,
            hour: hours as u8,
            minute: minutes as u8,
            second: seconds as u8,
        }
    }

    /// Converts an msdos (u16, u16) pair to a DateTime object if it represents a valid date
    pub fn try_from_msdos(datepart: u16, timepart: u16) -> Result<DateTime, DateTimeRangeError> {
        let dt = Self::from_msdos_unchecked(datepart, timepart);
        if dt.is_valid() {
            Ok(dt)
        } else {
            Err(DateTimeRangeError)
        }
    }

    /// Constructs a DateTime from a specific date and time
    ///
    /// The bounds are:
    /// * year: [1980, 2107]
    /// * month: [1, 12]
    /// * day: [1, 31]
    /// * hour: [0, 23]
    /// * minute: [0, 59]
    /// * second: [0, 60]
    pub fn from_date_and_time(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> Result<DateTime, DateTimeRangeError> {
        if (1980..=2107).contains(&year)
            && (1..=12).contains(&month)
            && (1..=31).contains(&day)
            && hour <= 23
            && minute <= 59
            && second <= 60
        {
            Ok(DateTime {
                year,
                month,
                day,
                hour,
                minute,
                second,
            })
        } else {
            Err(DateTimeRangeError)
        }
    }

    /// Indicates whether this date and time lies within the DOS range.
    pub fn is_valid(&self) -> bool {
        DateTime::from_date_and_time(
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
        )
        .is_ok()
    }

    /// Gets the time portion of this datetime in the msdos representation
    pub const fn timepart(&self) -> u16 {
        ((self.second as u16) >> 1) | ((self.minute as u16) << 5) | ((self.hour as u16) << 11)
    }

    /// Gets the date portion of this datetime in the msdos representation
    pub const fn datepart(&self) -> u16 {
        (self.day as u16) | ((self.month as u16) << 5) | ((self.year - 1980) << 9)
    }

    /// Converts the DateTime to an OffsetDateTime, assuming UTC
    pub fn to_time(&self) -> Result<OffsetDateTime, DateTimeRangeError> {
        let date =
            Date::from_calendar_date(self.year as i32, Month::try_from(self.month)?, self.day)?;
        // DOS seconds are even; 60 only shows up from a corrupt field.
        let time = Time::from_hms(self.hour, self.minute, self.second.min(59))?;
        Ok(PrimitiveDateTime::new(date, time).assume_utc())
    }

    /// Get the year. There is no epoch, i.e. 2018 will be returned as 2018.
    pub const fn year(&self) -> u16 {
        self.year
    }

    /// Get the month, where 1 = january and 12 = december
    pub const fn month(&self) -> u8 {
        self.month
    }

    /// Get the day
    pub const fn day(&self) -> u8 {
        self.day
    }

    /// Get the hour
    pub const fn hour(&self) -> u8 {
        self.hour
    }

    /// Get the minute
    pub const fn minute(&self) -> u8 {
        self.minute
    }

    /// Get the second
    pub const fn second(&self) -> u8 {
        self.second
    }
}

/// Seconds since the Unix epoch (as stored by the ZIP extra fields) to a calendar time.
pub(crate) fn unix_seconds_to_time(seconds: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(seconds).ok()
}

/// Windows FILETIME (100ns ticks since 1601-01-01) to a calendar time.
pub(crate) fn filetime_to_time(ticks: u64) -> Option<OffsetDateTime> {
    const TICKS_PER_SECOND: u64 = 10_000_000;
    const UNIX_EPOCH_IN_TICKS: i128 = 116_444_736_000_000_000;

    if ticks == 0 {
        return None;
    }
    let nanos = (ticks as i128 - UNIX_EPOCH_IN_TICKS) * (1_000_000_000 / TICKS_PER_SECOND as i128);
    OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
}

/// A calendar time at a fixed offset counted in 15-minute units, as ISO 9660 records it.
pub(crate) fn offset_from_quarter_hours(quarter_hours: i8) -> Result<UtcOffset, DateTimeRangeError> {
    Ok(UtcOffset::from_whole_seconds(i32::from(quarter_hours) * 15 * 60)?)
}
