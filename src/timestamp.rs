//! Parsing and storage of the timestamps attached to expenses.
//!
//! Callers send timestamps in a handful of shapes, so [parse_timestamp] accepts
//! RFC 3339 date-times, date-times without an offset and bare dates. Every
//! timestamp is normalised to UTC.
//!
//! In the database, timestamps are stored as fixed-width UTC text so that
//! comparing two stored values as strings gives the same answer as comparing
//! them as points in time.

use rusqlite::{
    ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, Time,
    format_description::{BorrowedFormatItem, well_known::Rfc3339},
    macros::format_description,
};

/// The format used for timestamps in the database.
const STORAGE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
);

/// Date-times without an offset, interpreted as UTC.
const LOCAL_DATE_TIME_FORMATS: [&[BorrowedFormatItem<'static>]; 6] = [
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]"),
];

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Parse `text` as a timestamp and convert it to UTC.
///
/// Returns `None` if `text` is not in any of the accepted formats:
/// - RFC 3339, e.g. `2024-01-01T10:00:00+05:30`,
/// - a date-time without an offset, e.g. `2024-01-01T10:00:00` or
///   `2024-01-01 10:00`, which is taken to be UTC,
/// - a date, e.g. `2024-01-01`, which is taken to be midnight UTC.
pub fn parse_timestamp(text: &str) -> Option<OffsetDateTime> {
    let text = text.trim();

    if let Ok(timestamp) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(timestamp.to_offset(time::UtcOffset::UTC));
    }

    for format in LOCAL_DATE_TIME_FORMATS {
        if let Ok(date_time) = PrimitiveDateTime::parse(text, format) {
            return Some(date_time.assume_utc());
        }
    }

    Date::parse(text, DATE_FORMAT)
        .ok()
        .map(|date| PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_utc())
}

/// A UTC timestamp as it is written to and read from the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StoredTimestamp(pub OffsetDateTime);

impl ToSql for StoredTimestamp {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let text = self
            .0
            .to_offset(time::UtcOffset::UTC)
            .format(STORAGE_FORMAT)
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;

        Ok(ToSqlOutput::from(text))
    }
}

impl FromSql for StoredTimestamp {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;

        PrimitiveDateTime::parse(text, STORAGE_FORMAT)
            .map(|date_time| StoredTimestamp(date_time.assume_utc()))
            .map_err(|error| FromSqlError::Other(Box::new(error)))
    }
}
