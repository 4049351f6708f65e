//! Decoding of the `after` pagination cursor into a typed composite key.

use rustc_hash::FxHashMap;
use serde_json::Value as JsonValue;

use crate::date::parse_date_millis;
use crate::error::CompositeError;
use crate::key::{CompositeKey, KeyValue};
use crate::provider::ValueType;
use crate::sources::{geotile, BoundKind, BoundSource};

/// Decodes and validates a user-supplied after key against the configured
/// sources, walking them in declaration order. The decoded key is the
/// exclusive lower pagination bound.
pub(crate) fn decode_after_key(
    after: &FxHashMap<String, JsonValue>,
    sources: &[BoundSource],
) -> crate::Result<CompositeKey> {
    if after.len() != sources.len() {
        return Err(CompositeError::InvalidRequest(format!(
            "after key must contain exactly one value per source, got {} values for {} sources",
            after.len(),
            sources.len()
        )));
    }
    let mut values = Vec::with_capacity(sources.len());
    for (position, source) in sources.iter().enumerate() {
        let Some(raw) = after.get(&source.name) else {
            return Err(CompositeError::AfterKey {
                field: source.name.clone(),
                position,
                detail: "no value provided for this source".to_string(),
            });
        };
        match try_decode(raw, source) {
            Ok(value) => values.push(value),
            Err(detail) => {
                return Err(CompositeError::AfterKey {
                    field: source.name.clone(),
                    position,
                    detail,
                })
            }
        }
    }
    Ok(CompositeKey(values))
}

fn try_decode(raw: &JsonValue, source: &BoundSource) -> Result<KeyValue, String> {
    if raw.is_null() {
        if source.missing_bucket {
            return Ok(KeyValue::Missing);
        }
        return Err("null is only allowed when missing_bucket is set".to_string());
    }
    match &source.kind {
        BoundKind::Terms(Some(value_type)) => decode_term(raw, *value_type),
        BoundKind::Terms(None) => {
            Err("field is unmapped, only null is accepted".to_string())
        }
        BoundKind::Histogram { .. } => match raw.as_f64() {
            Some(val) if val.is_finite() => Ok(KeyValue::f64(val)),
            _ => Err(format!(
                "invalid value, expected double, got {}",
                json_kind(raw)
            )),
        },
        BoundKind::DateHistogram(_) => decode_date(raw),
        BoundKind::GeotileGrid { precision } => decode_geotile(raw, *precision),
    }
}

fn decode_term(raw: &JsonValue, value_type: ValueType) -> Result<KeyValue, String> {
    match value_type {
        ValueType::Str => match raw {
            JsonValue::String(val) => Ok(KeyValue::Str(val.clone())),
            other => Err(format!(
                "invalid value, expected string, got {}",
                json_kind(other)
            )),
        },
        ValueType::I64 | ValueType::Millis => match raw.as_i64() {
            Some(val) => Ok(KeyValue::I64(val)),
            None => Err(format!(
                "invalid value, expected long, got {}",
                json_kind(raw)
            )),
        },
        ValueType::F64 => match raw.as_f64() {
            Some(val) if val.is_finite() => Ok(KeyValue::f64(val)),
            _ => Err(format!(
                "invalid value, expected double, got {}",
                json_kind(raw)
            )),
        },
        // bind_source rejects geo_point terms before decoding starts
        ValueType::GeoPoint => Err("terms cannot be keyed by geo_point values".to_string()),
    }
}

fn decode_date(raw: &JsonValue) -> Result<KeyValue, String> {
    match raw {
        JsonValue::Number(_) => match raw.as_i64() {
            Some(val) => Ok(KeyValue::I64(val)),
            None => Err(format!(
                "invalid value, expected long epoch milliseconds, got {}",
                json_kind(raw)
            )),
        },
        JsonValue::String(val) => {
            if val.contains("now") {
                return Err("now() is not supported in [after] key".to_string());
            }
            parse_date_millis(val)
                .map(KeyValue::I64)
                .map_err(|err| err.to_string())
        }
        other => Err(format!(
            "invalid value, expected long or date string, got {}",
            json_kind(other)
        )),
    }
}

fn decode_geotile(raw: &JsonValue, precision: u8) -> Result<KeyValue, String> {
    let id = match raw {
        JsonValue::String(addr) => geotile::parse(addr)?,
        JsonValue::Number(_) => raw
            .as_i64()
            .ok_or_else(|| format!("invalid value, expected tile id, got {}", json_kind(raw)))?,
        other => {
            return Err(format!(
                "invalid value, expected 'zoom/x/y' or tile id, got {}",
                json_kind(other)
            ))
        }
    };
    let (zoom, _x, _y) = geotile::split(id);
    if zoom != precision {
        return Err(format!(
            "tile zoom {zoom} does not match the source precision {precision}"
        ));
    }
    Ok(KeyValue::I64(id))
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "Boolean",
        JsonValue::String(_) => "String",
        JsonValue::Number(number) => {
            if number.is_i64() || number.is_u64() {
                "Long"
            } else {
                "Double"
            }
        }
        JsonValue::Array(_) => "Array",
        JsonValue::Object(_) => "Object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::sources::calendar::TimeZoneSpec;
    use crate::sources::{DateFormat, DateRounding, Order, ResolvedInterval};

    fn terms_source(name: &str, value_type: Option<ValueType>, missing_bucket: bool) -> BoundSource {
        BoundSource {
            name: name.to_string(),
            field: name.to_string(),
            order: Order::Asc,
            missing_bucket,
            kind: BoundKind::Terms(value_type),
        }
    }

    fn after_map(entries: &[(&str, JsonValue)]) -> FxHashMap<String, JsonValue> {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_decode_positional_type_mismatch() {
        let sources = vec![
            terms_source("keyword", Some(ValueType::Str), false),
            terms_source("long", Some(ValueType::I64), false),
        ];
        let err = decode_after_key(
            &after_map(&[("keyword", json!(0)), ("long", json!(100))]),
            &sources,
        )
        .unwrap_err();
        match &err {
            CompositeError::AfterKey {
                field,
                position,
                detail,
            } => {
                assert_eq!(field, "keyword");
                assert_eq!(*position, 0);
                assert_eq!(detail, "invalid value, expected string, got Long");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("in the position 0"));
    }

    #[test]
    fn test_decode_valid_multi_source_key() {
        let sources = vec![
            terms_source("keyword", Some(ValueType::Str), false),
            terms_source("long", Some(ValueType::I64), false),
        ];
        let key = decode_after_key(
            &after_map(&[("keyword", json!("a")), ("long", json!(100))]),
            &sources,
        )
        .unwrap();
        assert_eq!(
            key,
            CompositeKey(vec![KeyValue::Str("a".to_string()), KeyValue::I64(100)])
        );
    }

    #[test]
    fn test_decode_null_requires_missing_bucket() {
        let without_missing = vec![terms_source("keyword", Some(ValueType::Str), false)];
        assert!(decode_after_key(&after_map(&[("keyword", json!(null))]), &without_missing).is_err());

        let with_missing = vec![terms_source("keyword", Some(ValueType::Str), true)];
        let key =
            decode_after_key(&after_map(&[("keyword", json!(null))]), &with_missing).unwrap();
        assert_eq!(key, CompositeKey(vec![KeyValue::Missing]));
    }

    #[test]
    fn test_decode_date_rejects_now() {
        let sources = vec![BoundSource {
            name: "date".to_string(),
            field: "date".to_string(),
            order: Order::Asc,
            missing_bucket: false,
            kind: BoundKind::DateHistogram(DateRounding {
                interval: ResolvedInterval::FixedMillis(86_400_000),
                zone: TimeZoneSpec::Utc,
                offset_millis: 0,
                format: DateFormat::EpochMillis,
            }),
        }];
        let err =
            decode_after_key(&after_map(&[("date", json!("now"))]), &sources).unwrap_err();
        assert!(err
            .to_string()
            .contains("now() is not supported in [after] key"));
        let err = decode_after_key(&after_map(&[("date", json!("now-1d"))]), &sources)
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("now() is not supported in [after] key"));
    }

    #[test]
    fn test_decode_date_accepts_millis_and_rfc3339() {
        let sources = vec![BoundSource {
            name: "date".to_string(),
            field: "date".to_string(),
            order: Order::Asc,
            missing_bucket: false,
            kind: BoundKind::DateHistogram(DateRounding {
                interval: ResolvedInterval::FixedMillis(86_400_000),
                zone: TimeZoneSpec::Utc,
                offset_millis: 0,
                format: DateFormat::EpochMillis,
            }),
        }];
        let from_millis =
            decode_after_key(&after_map(&[("date", json!(1_508_457_600_000i64))]), &sources)
                .unwrap();
        let from_string = decode_after_key(
            &after_map(&[("date", json!("2017-10-20T00:00:00Z"))]),
            &sources,
        )
        .unwrap();
        assert_eq!(from_millis, from_string);
        // malformed strings surface as a parse error on the field
        assert!(decode_after_key(&after_map(&[("date", json!("20/10/2017"))]), &sources).is_err());
    }

    #[test]
    fn test_decode_geotile_address_and_id() {
        let sources = vec![BoundSource {
            name: "tile".to_string(),
            field: "tile".to_string(),
            order: Order::Asc,
            missing_bucket: false,
            kind: BoundKind::GeotileGrid { precision: 7 },
        }];
        let from_addr =
            decode_after_key(&after_map(&[("tile", json!("7/32/56"))]), &sources).unwrap();
        let id = match from_addr.0[0] {
            KeyValue::I64(id) => id,
            ref other => panic!("unexpected key value: {other:?}"),
        };
        let from_id = decode_after_key(&after_map(&[("tile", json!(id))]), &sources).unwrap();
        assert_eq!(from_addr, from_id);
        // zoom must match the configured precision
        assert!(decode_after_key(&after_map(&[("tile", json!("6/32/56"))]), &sources).is_err());
    }

    #[test]
    fn test_decode_rejects_wrong_cardinality_and_unknown_names() {
        let sources = vec![
            terms_source("a", Some(ValueType::Str), false),
            terms_source("b", Some(ValueType::Str), false),
        ];
        assert!(decode_after_key(&after_map(&[("a", json!("x"))]), &sources).is_err());
        let err = decode_after_key(
            &after_map(&[("a", json!("x")), ("wrong", json!("y"))]),
            &sources,
        )
        .unwrap_err();
        match err {
            CompositeError::AfterKey { field, position, .. } => {
                assert_eq!(field, "b");
                assert_eq!(position, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
