//! Contains the composite aggregation request.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::CompositeError;
use crate::key::{CompositeKey, CompositeOrdering};
use crate::provider::{Partition, ValueType};
use crate::sources::calendar::TimeZoneSpec;
use crate::sources::{
    geotile, parse_duration_millis, BoundKind, BoundSource, DateRounding, ResolvedInterval,
    SourceSpec,
};

/// Page size used when the request does not set one.
pub const DEFAULT_SIZE: u32 = 10;

/// A paginable aggregation over multiple dimensions (sources).
///
/// Buckets are ordered by the composite key, so the next page can be fetched
/// by passing the previous page's `after_key` back as `after`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "CompositeAggregationSerde",
    into = "CompositeAggregationSerde"
)]
pub struct CompositeAggregation {
    /// The dimensions and their bucketing strategies.
    pub sources: Vec<SourceSpec>,
    /// Number of buckets to return (page size).
    pub size: u32,
    /// The key of the previous page's last bucket, exclusive lower bound.
    pub after: Option<FxHashMap<String, JsonValue>>,
}

#[derive(Serialize, Deserialize)]
struct CompositeAggregationSerde {
    sources: Vec<FxHashMap<String, SourceSpec>>,
    #[serde(default = "default_size")]
    size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    after: Option<FxHashMap<String, JsonValue>>,
}

fn default_size() -> u32 {
    DEFAULT_SIZE
}

impl TryFrom<CompositeAggregationSerde> for CompositeAggregation {
    type Error = CompositeError;

    fn try_from(value: CompositeAggregationSerde) -> Result<Self, Self::Error> {
        let mut sources = Vec::with_capacity(value.sources.len());
        for map in value.sources {
            if map.len() != 1 {
                return Err(CompositeError::InvalidRequest(
                    "each composite source must have exactly one named entry".to_string(),
                ));
            }
            let Some((name, mut source)) = map.into_iter().next() else {
                return Err(CompositeError::InvalidRequest(
                    "each composite source must have exactly one named entry".to_string(),
                ));
            };
            source.set_name(name);
            sources.push(source);
        }
        Ok(CompositeAggregation {
            sources,
            size: value.size,
            after: value.after,
        })
    }
}

impl From<CompositeAggregation> for CompositeAggregationSerde {
    fn from(value: CompositeAggregation) -> Self {
        let serde_sources = value
            .sources
            .into_iter()
            .map(|source| {
                let mut map = FxHashMap::default();
                // the name field is #[serde(skip)] so it won't be serialized
                // inside the value
                map.insert(source.name().to_string(), source);
                map
            })
            .collect();
        CompositeAggregationSerde {
            sources: serde_sources,
            size: value.size,
            after: value.after,
        }
    }
}

impl CompositeAggregation {
    /// Checks the request configuration. Runs before any document is
    /// scanned; a request that validates never fails on configuration
    /// grounds later.
    pub fn validate(&self) -> crate::Result<()> {
        if self.sources.is_empty() {
            return Err(CompositeError::InvalidRequest(
                "composite aggregation must have at least one source".to_string(),
            ));
        }
        if self.size == 0 {
            return Err(CompositeError::InvalidRequest(
                "composite aggregation 'size' must be > 0".to_string(),
            ));
        }
        let mut seen_names = FxHashSet::default();
        for source in &self.sources {
            if source.name().is_empty() {
                return Err(CompositeError::InvalidRequest(
                    "composite source names must not be empty".to_string(),
                ));
            }
            if !seen_names.insert(source.name()) {
                return Err(CompositeError::InvalidRequest(format!(
                    "duplicate composite source name '{}'",
                    source.name()
                )));
            }
            self.validate_source(source)?;
        }
        Ok(())
    }

    fn validate_source(&self, source: &SourceSpec) -> crate::Result<()> {
        match source {
            SourceSpec::Terms(_) => {}
            SourceSpec::Histogram(histogram) => {
                if !histogram.interval.is_finite() || histogram.interval <= 0.0 {
                    return Err(CompositeError::InvalidRequest(format!(
                        "histogram source '{}' requires a positive finite interval, got {}",
                        histogram.name, histogram.interval
                    )));
                }
            }
            SourceSpec::DateHistogram(date_histogram) => {
                match (
                    &date_histogram.fixed_interval,
                    &date_histogram.calendar_interval,
                ) {
                    (Some(_), Some(_)) => {
                        return Err(CompositeError::InvalidRequest(format!(
                            "date histogram source '{}' must set only one of fixed_interval and \
                             calendar_interval",
                            date_histogram.name
                        )))
                    }
                    (None, None) => {
                        return Err(CompositeError::InvalidRequest(format!(
                            "date histogram source '{}' requires fixed_interval or \
                             calendar_interval",
                            date_histogram.name
                        )))
                    }
                    (Some(fixed), None) => {
                        let millis = parse_duration_millis(fixed)
                            .map_err(|err| CompositeError::InvalidRequest(err.to_string()))?;
                        if millis <= 0 {
                            return Err(CompositeError::InvalidRequest(format!(
                                "date histogram source '{}' requires a positive fixed_interval",
                                date_histogram.name
                            )));
                        }
                    }
                    (None, Some(_)) => {}
                }
                if let Some(zone) = &date_histogram.time_zone {
                    TimeZoneSpec::parse(zone)?;
                }
                if let Some(offset) = &date_histogram.offset {
                    parse_duration_millis(offset)
                        .map_err(|err| CompositeError::InvalidRequest(err.to_string()))?;
                }
            }
            SourceSpec::GeotileGrid(geotile_grid) => {
                if geotile_grid.precision > geotile::MAX_ZOOM {
                    return Err(CompositeError::InvalidRequest(format!(
                        "geotile_grid source '{}' precision {} exceeds the maximum of {}",
                        geotile_grid.name,
                        geotile_grid.precision,
                        geotile::MAX_ZOOM
                    )));
                }
            }
        }
        Ok(())
    }

    /// Resolves the request against the partition set: field types bound and
    /// checked for consistency, intervals and zones parsed, after key
    /// decoded. Runs before any document is scanned.
    pub(crate) fn bind(&self, partitions: &[&dyn Partition]) -> crate::Result<BoundRequest> {
        self.validate()?;
        let mut sources = Vec::with_capacity(self.sources.len());
        for spec in &self.sources {
            sources.push(self.bind_source(spec, partitions)?);
        }
        let ordering = CompositeOrdering::from_sources(&self.sources);
        let after = match &self.after {
            Some(after) => Some(crate::after_key::decode_after_key(after, &sources)?),
            None => None,
        };
        Ok(BoundRequest {
            sources,
            ordering,
            size: self.size,
            after,
        })
    }

    fn bind_source(
        &self,
        spec: &SourceSpec,
        partitions: &[&dyn Partition],
    ) -> crate::Result<BoundSource> {
        let field_type = resolve_field_type(spec.field(), partitions)?;
        if field_type.is_none() && !spec.missing_bucket() {
            return Err(CompositeError::InvalidRequest(format!(
                "field '{}' of source '{}' is unmapped; set missing_bucket to aggregate on it",
                spec.field(),
                spec.name()
            )));
        }
        let kind = match spec {
            SourceSpec::Terms(_) => match field_type {
                Some(ValueType::GeoPoint) => {
                    return Err(CompositeError::InvalidRequest(format!(
                        "terms source '{}' cannot aggregate on geo_point field '{}'",
                        spec.name(),
                        spec.field()
                    )))
                }
                other => BoundKind::Terms(other),
            },
            SourceSpec::Histogram(histogram) => {
                match field_type {
                    None | Some(ValueType::I64 | ValueType::F64 | ValueType::Millis) => {}
                    Some(other) => {
                        return Err(CompositeError::InvalidRequest(format!(
                            "histogram source '{}' requires a numeric field, '{}' is {other:?}",
                            spec.name(),
                            spec.field()
                        )))
                    }
                }
                BoundKind::Histogram {
                    interval: histogram.interval,
                }
            }
            SourceSpec::DateHistogram(date_histogram) => {
                match field_type {
                    None | Some(ValueType::Millis | ValueType::I64) => {}
                    Some(other) => {
                        return Err(CompositeError::InvalidRequest(format!(
                            "date histogram source '{}' requires a date field, '{}' is {other:?}",
                            spec.name(),
                            spec.field()
                        )))
                    }
                }
                let interval = match (
                    &date_histogram.fixed_interval,
                    &date_histogram.calendar_interval,
                ) {
                    (Some(fixed), None) => ResolvedInterval::FixedMillis(
                        parse_duration_millis(fixed)
                            .map_err(|err| CompositeError::InvalidRequest(err.to_string()))?,
                    ),
                    (None, Some(calendar)) => ResolvedInterval::Calendar(*calendar),
                    // validate() enforces exactly one interval
                    _ => {
                        return Err(CompositeError::InternalError(
                            "date histogram interval not resolved".to_string(),
                        ))
                    }
                };
                let zone = match &date_histogram.time_zone {
                    Some(zone) => TimeZoneSpec::parse(zone)?,
                    None => TimeZoneSpec::Utc,
                };
                let offset_millis = match &date_histogram.offset {
                    Some(offset) => parse_duration_millis(offset)
                        .map_err(|err| CompositeError::InvalidRequest(err.to_string()))?,
                    None => 0,
                };
                BoundKind::DateHistogram(DateRounding {
                    interval,
                    zone,
                    offset_millis,
                    format: date_histogram.format.unwrap_or_default(),
                })
            }
            SourceSpec::GeotileGrid(geotile_grid) => {
                match field_type {
                    None | Some(ValueType::GeoPoint) => {}
                    Some(other) => {
                        return Err(CompositeError::InvalidRequest(format!(
                            "geotile_grid source '{}' requires a geo_point field, '{}' is \
                             {other:?}",
                            spec.name(),
                            spec.field()
                        )))
                    }
                }
                BoundKind::GeotileGrid {
                    precision: geotile_grid.precision,
                }
            }
        };
        Ok(BoundSource {
            name: spec.name().to_string(),
            field: spec.field().to_string(),
            order: spec.order(),
            missing_bucket: spec.missing_bucket(),
            kind,
        })
    }
}

fn resolve_field_type(
    field: &str,
    partitions: &[&dyn Partition],
) -> crate::Result<Option<ValueType>> {
    let mut resolved = None;
    for partition in partitions {
        if let Some(value_type) = partition.values().value_type(field) {
            match resolved {
                None => resolved = Some(value_type),
                Some(previous) if previous != value_type => {
                    return Err(CompositeError::InvalidRequest(format!(
                        "field '{field}' has inconsistent types across partitions: {previous:?} \
                         vs {value_type:?}"
                    )))
                }
                Some(_) => {}
            }
        }
    }
    Ok(resolved)
}

/// A request resolved against the partition set, shared read-only by all
/// partition collectors.
#[derive(Clone, Debug)]
pub(crate) struct BoundRequest {
    pub(crate) sources: Vec<BoundSource>,
    pub(crate) ordering: CompositeOrdering,
    pub(crate) size: u32,
    pub(crate) after: Option<CompositeKey>,
}
