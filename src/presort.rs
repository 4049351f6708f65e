//! Detection of partitions whose physical document order already satisfies
//! the requested composite ordering.
//!
//! When the partition's primary sort field matches the request's leading
//! source (same field, same direction) and the source's transform preserves
//! that order, a full collector can stop scanning as soon as the stream's
//! leading value exceeds the worst retained key. Trailing physical sort
//! fields beyond the leading one are ignored.

use crate::provider::SortField;
use crate::sources::{BoundKind, BoundSource};

/// Marker for a partition where the leading-dimension stop rule applies.
#[derive(Clone, Copy, Debug)]
pub(crate) struct EarlyTermination;

pub(crate) fn detect(
    sort_fields: &[SortField],
    sources: &[BoundSource],
) -> Option<EarlyTermination> {
    let leading = sort_fields.first()?;
    let source = sources.first()?;
    if leading.field != source.field || leading.order != source.order {
        return None;
    }
    // missing documents can appear anywhere in the physical order, so a
    // missing bucket voids the guarantee
    if source.missing_bucket {
        return None;
    }
    match source.kind {
        // tile encoding is not monotonic in latitude/longitude
        BoundKind::GeotileGrid { .. } => None,
        _ => Some(EarlyTermination),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ValueType;
    use crate::sources::Order;

    fn sort_field(field: &str, order: Order) -> SortField {
        SortField {
            field: field.to_string(),
            order,
        }
    }

    fn terms_source(field: &str, order: Order, missing_bucket: bool) -> BoundSource {
        BoundSource {
            name: field.to_string(),
            field: field.to_string(),
            order,
            missing_bucket,
            kind: BoundKind::Terms(Some(ValueType::Str)),
        }
    }

    #[test]
    fn test_detects_matching_leading_field() {
        let detected = detect(
            &[sort_field("category", Order::Asc)],
            &[terms_source("category", Order::Asc, false)],
        );
        assert!(detected.is_some());
    }

    #[test]
    fn test_trailing_sort_fields_are_ignored() {
        let detected = detect(
            &[
                sort_field("category", Order::Asc),
                sort_field("timestamp", Order::Desc),
            ],
            &[terms_source("category", Order::Asc, false)],
        );
        assert!(detected.is_some());
    }

    #[test]
    fn test_rejects_field_or_direction_mismatch() {
        assert!(detect(
            &[sort_field("other", Order::Asc)],
            &[terms_source("category", Order::Asc, false)]
        )
        .is_none());
        assert!(detect(
            &[sort_field("category", Order::Desc)],
            &[terms_source("category", Order::Asc, false)]
        )
        .is_none());
        assert!(detect(&[], &[terms_source("category", Order::Asc, false)]).is_none());
    }

    #[test]
    fn test_rejects_missing_bucket_sources() {
        assert!(detect(
            &[sort_field("category", Order::Asc)],
            &[terms_source("category", Order::Asc, true)]
        )
        .is_none());
    }

    #[test]
    fn test_rejects_geotile_leading_source() {
        let source = BoundSource {
            name: "tile".to_string(),
            field: "location".to_string(),
            order: Order::Asc,
            missing_bucket: false,
            kind: BoundKind::GeotileGrid { precision: 7 },
        };
        assert!(detect(&[sort_field("location", Order::Asc)], &[source]).is_none());
    }
}
