//! Millisecond timestamp helpers for date histogram keys.

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::CompositeError;

pub(crate) fn format_date_millis(val: i64) -> crate::Result<String> {
    let datetime = OffsetDateTime::from_unix_timestamp_nanos(val as i128 * 1_000_000).map_err(
        |err| {
            CompositeError::InternalError(format!(
                "could not convert {val:?} to OffsetDateTime, err {err:?}"
            ))
        },
    )?;
    datetime
        .format(&Rfc3339)
        .map_err(|_err| CompositeError::InternalError("could not serialize date".to_string()))
}

pub(crate) fn parse_date_millis(date_string: &str) -> crate::Result<i64> {
    OffsetDateTime::parse(date_string, &Rfc3339)
        .map_err(|err| {
            CompositeError::InvalidRequest(format!(
                "could not parse '{date_string}' as RFC3339 date, err: {err:?}"
            ))
        })
        .map(|datetime| (datetime.unix_timestamp_nanos() / 1_000_000) as i64)
}
