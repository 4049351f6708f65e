//! The source kinds: each one contributes one dimension of the composite
//! key, with its own ordering direction, missing-value policy and bucket-key
//! transform.

pub(crate) mod calendar;
pub(crate) mod geotile;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::CompositeError;
use crate::key::KeyValue;
use crate::provider::{RawValue, ValueType};
use crate::sources::calendar::TimeZoneSpec;

/// Ordering direction of one source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    /// Ascending order.
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

/// Position of missing keys in the ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingOrder {
    /// Missing keys appear first in ascending order, last in descending
    /// order.
    #[default]
    Default,
    /// Missing keys always appear first.
    First,
    /// Missing keys always appear last.
    Last,
}

/// Terms source: buckets by the field's native values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermsSource {
    /// The name used to refer to this source in the composite key.
    #[serde(skip)]
    pub name: String,
    /// The field to aggregate on.
    pub field: String,
    /// The order for this source.
    #[serde(default)]
    pub order: Order,
    /// Whether to create a `null` bucket for documents without value for
    /// this field. By default documents without a value are ignored.
    #[serde(default)]
    pub missing_bucket: bool,
    /// Whether missing keys should appear first or last.
    #[serde(default)]
    pub missing_order: MissingOrder,
}

/// Histogram source: buckets numeric values by fixed-width intervals.
///
/// A raw value `v` maps to the bucket key `(v / interval).floor() *
/// interval`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistogramSource {
    /// The name used to refer to this source in the composite key.
    #[serde(skip)]
    pub name: String,
    /// The field to aggregate on.
    pub field: String,
    /// The interval for the histogram. Must be finite and positive.
    pub interval: f64,
    /// The order for this source.
    #[serde(default)]
    pub order: Order,
    /// Whether to create a `null` bucket for documents without value for
    /// this field.
    #[serde(default)]
    pub missing_bucket: bool,
    /// Whether missing keys should appear first or last.
    #[serde(default)]
    pub missing_order: MissingOrder,
}

/// Calendar intervals supported for date histogram sources.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarInterval {
    /// A year between Jan 1st and Dec 31st, taking into account leap years.
    Year,
    /// A month between the 1st and the last day of the month.
    Month,
    /// A week between Monday and Sunday.
    Week,
    /// A calendar day. Under a zone with daylight saving this is not always
    /// 24 hours.
    Day,
}

/// How date keys render in results and after keys.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    /// Keys are the bucket start as a number of milliseconds since epoch.
    #[default]
    EpochMillis,
    /// Keys render as RFC3339 strings.
    Rfc3339,
}

/// Date histogram source: buckets epoch-millisecond values by fixed or
/// calendar intervals, optionally evaluated in a time zone and shifted by an
/// offset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DateHistogramSource {
    /// The name used to refer to this source in the composite key.
    #[serde(skip)]
    pub name: String,
    /// The field to aggregate on.
    pub field: String,
    /// The fixed interval for the histogram, e.g. `"30d"`. Accepted units:
    /// `ms`, `s`, `m`, `h`, `d`. Either this or `calendar_interval` must be
    /// set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_interval: Option<String>,
    /// The calendar adjusted interval for the histogram. Either this or
    /// `fixed_interval` must be set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_interval: Option<CalendarInterval>,
    /// IANA zone name (e.g. `"America/New_York"`) or fixed `±HH:MM` offset
    /// the calendar rounding is evaluated in. UTC when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    /// Shift of the bucket boundaries, as a signed duration with the same
    /// unit grammar as `fixed_interval` (e.g. `"4h"`, `"-30m"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
    /// How bucket keys render in results and after keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<DateFormat>,
    /// The order for this source.
    #[serde(default)]
    pub order: Order,
    /// Whether to create a `null` bucket for documents without value for
    /// this field.
    #[serde(default)]
    pub missing_bucket: bool,
    /// Whether missing keys should appear first or last.
    #[serde(default)]
    pub missing_order: MissingOrder,
}

fn default_precision() -> u8 {
    7
}

/// Geo tile grid source: buckets geo points into web-mercator ("slippy")
/// tiles at a fixed zoom, keyed by the encoded tile id and rendered as
/// `"zoom/x/y"`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoTileGridSource {
    /// The name used to refer to this source in the composite key.
    #[serde(skip)]
    pub name: String,
    /// The field to aggregate on.
    pub field: String,
    /// The tile zoom level, `0..=29`.
    #[serde(default = "default_precision")]
    pub precision: u8,
    /// The order for this source.
    #[serde(default)]
    pub order: Order,
    /// Whether to create a `null` bucket for documents without value for
    /// this field.
    #[serde(default)]
    pub missing_bucket: bool,
    /// Whether missing keys should appear first or last.
    #[serde(default)]
    pub missing_order: MissingOrder,
}

/// Source for the composite aggregation. A composite aggregation can have
/// multiple sources.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSpec {
    /// Terms source.
    Terms(TermsSource),
    /// Histogram source.
    Histogram(HistogramSource),
    /// Date histogram source.
    DateHistogram(DateHistogramSource),
    /// Geo tile grid source.
    GeotileGrid(GeoTileGridSource),
}

impl SourceSpec {
    pub(crate) fn field(&self) -> &str {
        match self {
            SourceSpec::Terms(source) => &source.field,
            SourceSpec::Histogram(source) => &source.field,
            SourceSpec::DateHistogram(source) => &source.field,
            SourceSpec::GeotileGrid(source) => &source.field,
        }
    }

    pub(crate) fn name(&self) -> &str {
        match self {
            SourceSpec::Terms(source) => &source.name,
            SourceSpec::Histogram(source) => &source.name,
            SourceSpec::DateHistogram(source) => &source.name,
            SourceSpec::GeotileGrid(source) => &source.name,
        }
    }

    pub(crate) fn set_name(&mut self, name: String) {
        match self {
            SourceSpec::Terms(source) => source.name = name,
            SourceSpec::Histogram(source) => source.name = name,
            SourceSpec::DateHistogram(source) => source.name = name,
            SourceSpec::GeotileGrid(source) => source.name = name,
        }
    }

    pub(crate) fn order(&self) -> Order {
        match self {
            SourceSpec::Terms(source) => source.order,
            SourceSpec::Histogram(source) => source.order,
            SourceSpec::DateHistogram(source) => source.order,
            SourceSpec::GeotileGrid(source) => source.order,
        }
    }

    pub(crate) fn missing_bucket(&self) -> bool {
        match self {
            SourceSpec::Terms(source) => source.missing_bucket,
            SourceSpec::Histogram(source) => source.missing_bucket,
            SourceSpec::DateHistogram(source) => source.missing_bucket,
            SourceSpec::GeotileGrid(source) => source.missing_bucket,
        }
    }

    pub(crate) fn missing_order(&self) -> MissingOrder {
        match self {
            SourceSpec::Terms(source) => source.missing_order,
            SourceSpec::Histogram(source) => source.missing_order,
            SourceSpec::DateHistogram(source) => source.missing_order,
            SourceSpec::GeotileGrid(source) => source.missing_order,
        }
    }
}

/// Errors when parsing a fixed interval or offset duration.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DurationParseError {
    /// Unit not recognized in the passed string.
    #[error("unit not recognized in duration '{0}'")]
    UnitNotRecognized(String),
    /// Number not found in the passed string.
    #[error("number missing in duration '{0}'")]
    NumberMissing(String),
    /// Unit not found in the passed string.
    #[error("unit missing in duration '{0}'")]
    UnitMissing(String),
}

/// Parses a `<number><unit>` duration into milliseconds, with an optional
/// leading `-` (offsets may be negative).
pub(crate) fn parse_duration_millis(input: &str) -> Result<i64, DurationParseError> {
    let (sign, unsigned) = match input.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, input),
    };
    let split_boundary = unsigned
        .as_bytes()
        .iter()
        .take_while(|byte| byte.is_ascii_digit())
        .count();
    let (number, unit) = unsigned.split_at(split_boundary);
    if number.is_empty() {
        return Err(DurationParseError::NumberMissing(input.to_string()));
    }
    if unit.is_empty() {
        return Err(DurationParseError::UnitMissing(input.to_string()));
    }
    let number: i64 = number
        .parse()
        .map_err(|_err| DurationParseError::NumberMissing(input.to_string()))?;

    let multiplier_from_unit = match unit {
        "ms" => 1,
        "s" => 1000,
        "m" => 60 * 1000,
        "h" => 60 * 60 * 1000,
        "d" => 24 * 60 * 60 * 1000,
        _ => return Err(DurationParseError::UnitNotRecognized(unit.to_string())),
    };

    Ok(sign * number * multiplier_from_unit)
}

/// A date histogram interval resolved for collection.
#[derive(Clone, Copy, Debug)]
pub(crate) enum ResolvedInterval {
    /// Fixed-width interval in milliseconds.
    FixedMillis(i64),
    /// Calendar-aware interval.
    Calendar(CalendarInterval),
}

/// Date rounding resolved for collection: interval, zone and boundary
/// offset.
#[derive(Clone, Debug)]
pub(crate) struct DateRounding {
    pub(crate) interval: ResolvedInterval,
    pub(crate) zone: TimeZoneSpec,
    pub(crate) offset_millis: i64,
    pub(crate) format: DateFormat,
}

impl DateRounding {
    /// Rounds an epoch-millisecond timestamp down to its bucket key. The
    /// offset shifts the bucket boundaries: `round(t - offset) + offset`.
    pub(crate) fn round(&self, ts_millis: i64) -> crate::Result<i64> {
        let shifted = ts_millis - self.offset_millis;
        let rounded = match self.interval {
            ResolvedInterval::FixedMillis(interval) => shifted.div_euclid(interval) * interval,
            ResolvedInterval::Calendar(unit) => calendar::round_calendar(shifted, unit, &self.zone)?,
        };
        Ok(rounded + self.offset_millis)
    }
}

/// A source resolved against the partition set: field type bound, intervals
/// and zones parsed, ready to map raw values to key values.
#[derive(Clone, Debug)]
pub(crate) struct BoundSource {
    pub(crate) name: String,
    pub(crate) field: String,
    pub(crate) order: Order,
    pub(crate) missing_bucket: bool,
    pub(crate) kind: BoundKind,
}

#[derive(Clone, Debug)]
pub(crate) enum BoundKind {
    /// Terms with the field's resolved type; `None` when the field is
    /// unmapped in every partition (missing bucket only).
    Terms(Option<ValueType>),
    Histogram { interval: f64 },
    DateHistogram(DateRounding),
    GeotileGrid { precision: u8 },
}

impl BoundSource {
    /// Maps one raw value to this dimension's key value.
    pub(crate) fn key_of(&self, raw: &RawValue) -> crate::Result<KeyValue> {
        match &self.kind {
            BoundKind::Terms(value_type) => match (value_type, raw) {
                (Some(ValueType::Str), RawValue::Str(val)) => Ok(KeyValue::Str(val.clone())),
                (Some(ValueType::I64), RawValue::I64(val)) => Ok(KeyValue::I64(*val)),
                (Some(ValueType::Millis), RawValue::Millis(val)) => Ok(KeyValue::I64(*val)),
                (Some(ValueType::F64), RawValue::F64(val)) if val.is_finite() => {
                    Ok(KeyValue::f64(*val))
                }
                (Some(ValueType::F64), RawValue::F64(_)) => {
                    Err(self.type_mismatch("a finite double", "non-finite double"))
                }
                _ => Err(self.type_mismatch("the field's declared type", raw.kind_name())),
            },
            BoundKind::Histogram { interval } => {
                let val = match raw {
                    RawValue::I64(val) | RawValue::Millis(val) => *val as f64,
                    RawValue::F64(val) if val.is_finite() => *val,
                    RawValue::F64(_) => {
                        return Err(self.type_mismatch("a finite double", "non-finite double"))
                    }
                    other => return Err(self.type_mismatch("a numeric value", other.kind_name())),
                };
                Ok(KeyValue::f64((val / interval).floor() * interval))
            }
            BoundKind::DateHistogram(rounding) => {
                let ts_millis = match raw {
                    RawValue::Millis(val) | RawValue::I64(val) => *val,
                    other => {
                        return Err(
                            self.type_mismatch("an epoch-millisecond date", other.kind_name())
                        )
                    }
                };
                Ok(KeyValue::I64(rounding.round(ts_millis)?))
            }
            BoundKind::GeotileGrid { precision } => match raw {
                RawValue::GeoPoint { lat, lon } => {
                    Ok(KeyValue::I64(geotile::encode(*lat, *lon, *precision)))
                }
                other => Err(self.type_mismatch("a geo_point", other.kind_name())),
            },
        }
    }

    fn type_mismatch(&self, expected: &str, actual: &'static str) -> CompositeError {
        CompositeError::ValueTypeMismatch {
            field: self.field.clone(),
            expected: expected.to_string(),
            actual,
        }
    }
}
