//! Calendar rounding for date histogram sources, evaluated under a time
//! zone's rules.
//!
//! Rounding converts the instant to local wall-clock time, truncates to the
//! start of the unit, and maps the local start back to an instant. Under
//! daylight saving rules a calendar day is not always 24 hours, so the
//! zone's offset is looked up per instant instead of being applied as a
//! constant.

use std::fmt;

use time::{Duration, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};
use time_tz::{timezones, OffsetDateTimeExt, PrimitiveDateTimeExt, TimeZone, Tz};

use crate::error::CompositeError;
use crate::sources::CalendarInterval;

/// The zone calendar rounding is evaluated in.
#[derive(Clone, Copy)]
pub(crate) enum TimeZoneSpec {
    /// Plain UTC.
    Utc,
    /// A fixed offset from UTC, e.g. `-04:00`. No daylight saving rules.
    Fixed(UtcOffset),
    /// An IANA zone with full rules.
    Named(&'static Tz),
}

impl fmt::Debug for TimeZoneSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeZoneSpec::Utc => f.write_str("Utc"),
            TimeZoneSpec::Fixed(offset) => write!(f, "Fixed({offset})"),
            TimeZoneSpec::Named(tz) => write!(f, "Named({})", tz.name()),
        }
    }
}

impl TimeZoneSpec {
    /// Parses an IANA zone name or a fixed `±HH:MM` offset.
    pub(crate) fn parse(spec: &str) -> crate::Result<TimeZoneSpec> {
        if spec == "UTC" || spec == "Z" {
            return Ok(TimeZoneSpec::Utc);
        }
        if let Some(tz) = timezones::get_by_name(spec) {
            return Ok(TimeZoneSpec::Named(tz));
        }
        parse_fixed_offset(spec)
            .map(TimeZoneSpec::Fixed)
            .ok_or_else(|| CompositeError::InvalidRequest(format!("unknown time zone '{spec}'")))
    }
}

fn parse_fixed_offset(spec: &str) -> Option<UtcOffset> {
    let (sign, rest) = match spec.strip_prefix('+') {
        Some(rest) => (1i8, rest),
        None => (-1i8, spec.strip_prefix('-')?),
    };
    let (hours, minutes) = rest.split_once(':')?;
    if hours.len() != 2 || minutes.len() != 2 {
        return None;
    }
    let hours: i8 = hours.parse().ok()?;
    let minutes: i8 = minutes.parse().ok()?;
    UtcOffset::from_hms(sign * hours, sign * minutes, 0).ok()
}

/// Rounds an epoch-millisecond timestamp down to the start of the enclosing
/// calendar unit, evaluated in `zone`.
pub(crate) fn round_calendar(
    ts_millis: i64,
    unit: CalendarInterval,
    zone: &TimeZoneSpec,
) -> crate::Result<i64> {
    let utc = OffsetDateTime::from_unix_timestamp_nanos(ts_millis as i128 * 1_000_000).map_err(
        |err| {
            CompositeError::InternalError(format!(
                "timestamp {ts_millis}ms is out of the representable date range: {err}"
            ))
        },
    )?;
    let local = match zone {
        TimeZoneSpec::Utc => utc,
        TimeZoneSpec::Fixed(offset) => utc.to_offset(*offset),
        TimeZoneSpec::Named(tz) => utc.to_timezone(*tz),
    };
    let date = local.date();
    let start_date = match unit {
        CalendarInterval::Day => date,
        CalendarInterval::Week => {
            date - Duration::days(i64::from(date.weekday().number_days_from_monday()))
        }
        CalendarInterval::Month => date.replace_day(1).map_err(|err| {
            CompositeError::InternalError(format!("failed to compute month start: {err}"))
        })?,
        CalendarInterval::Year => date.replace_ordinal(1).map_err(|err| {
            CompositeError::InternalError(format!("failed to compute year start: {err}"))
        })?,
    };
    let start = PrimitiveDateTime::new(start_date, Time::MIDNIGHT);
    let start_utc = match zone {
        TimeZoneSpec::Utc => start.assume_utc(),
        TimeZoneSpec::Fixed(offset) => start.assume_offset(*offset),
        TimeZoneSpec::Named(tz) => resolve_local(start, tz)?,
    };
    Ok((start_utc.unix_timestamp_nanos() / 1_000_000) as i64)
}

/// Resolves a local wall-clock time to an instant. Ambiguous times (clocks
/// rolled back) take the earlier instant; times inside a DST gap (clocks
/// jumped forward over midnight) resolve to the first valid instant after
/// the gap.
fn resolve_local(local: PrimitiveDateTime, tz: &'static Tz) -> crate::Result<OffsetDateTime> {
    match local.assume_timezone(tz) {
        time_tz::OffsetResult::Some(instant) => Ok(instant),
        time_tz::OffsetResult::Ambiguous(earliest, _latest) => Ok(earliest),
        time_tz::OffsetResult::None => {
            let mut probe = local;
            for _ in 0..8 {
                probe += Duration::minutes(15);
                match probe.assume_timezone(tz) {
                    time_tz::OffsetResult::Some(instant) => return Ok(instant),
                    time_tz::OffsetResult::Ambiguous(earliest, _latest) => return Ok(earliest),
                    time_tz::OffsetResult::None => {}
                }
            }
            Err(CompositeError::InternalError(format!(
                "could not resolve local time {local} in zone {}",
                tz.name()
            )))
        }
    }
}
