//! The final composite aggregation result and its JSON form.
//!
//! Buckets serialize as `{"key": {source_name: value}, "doc_count": n}` plus
//! one top-level `after_key` map. Per-source display rendering happens here:
//! geo tile ids render as `"zoom/x/y"` and date keys optionally as RFC3339
//! strings, while the internal ordering stays numeric.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::agg_req::BoundRequest;
use crate::date::format_date_millis;
use crate::intermediate::PartialCompositeResult;
use crate::key::{CompositeKey, KeyValue};
use crate::provider::BucketSink;
use crate::sources::{geotile, BoundKind, BoundSource, DateFormat};

/// One rendered dimension of a bucket key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyEntry {
    /// The missing bucket.
    Null,
    /// String rendering (terms on text fields, geo tiles, formatted dates).
    Str(String),
    /// Integer rendering (numeric terms, epoch milliseconds).
    I64(i64),
    /// Float rendering (histogram buckets, float terms).
    F64(f64),
}

/// A bucket key rendered as a `{source_name: value}` map, names in source
/// declaration order.
#[derive(Clone, Debug, PartialEq)]
pub struct BucketKey(pub Vec<(String, KeyEntry)>);

impl Serialize for BucketKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, entry) in &self.0 {
            map.serialize_entry(name, entry)?;
        }
        map.end()
    }
}

/// A single composite bucket.
#[derive(Debug, Serialize)]
pub struct CompositeBucket {
    /// The bucket's composite key.
    pub key: BucketKey,
    /// Number of documents that mapped to this key.
    pub doc_count: u64,
    /// Sub-aggregation state accumulated by the caller's sink, if a
    /// blueprint was provided. Opaque to this crate.
    #[serde(skip)]
    pub sub_aggregation: Option<Box<dyn BucketSink>>,
}

/// The final paginated result.
#[derive(Debug, Serialize)]
pub struct CompositeResult {
    /// The buckets, ascending by the composite order, at most `size` of
    /// them.
    pub buckets: Vec<CompositeBucket>,
    /// Pagination cursor: the last bucket's key. Absent when no bucket was
    /// emitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_key: Option<BucketKey>,
    /// True when any partition stopped scanning before exhausting its input,
    /// for efficiency or cancellation.
    pub terminated_early: bool,
}

impl CompositeResult {
    pub(crate) fn from_partial(
        partial: PartialCompositeResult,
        req: &BoundRequest,
    ) -> crate::Result<CompositeResult> {
        let mut buckets = Vec::with_capacity(partial.entries.len());
        for (key, bucket) in partial.entries {
            buckets.push(CompositeBucket {
                key: render_key(&key, req)?,
                doc_count: bucket.doc_count,
                sub_aggregation: bucket.sink,
            });
        }
        let after_key = buckets.last().map(|bucket| bucket.key.clone());
        Ok(CompositeResult {
            buckets,
            after_key,
            terminated_early: partial.terminated_early,
        })
    }
}

fn render_key(key: &CompositeKey, req: &BoundRequest) -> crate::Result<BucketKey> {
    let mut entries = Vec::with_capacity(key.0.len());
    for (value, source) in key.0.iter().zip(&req.sources) {
        entries.push((source.name.clone(), render_value(value, source)?));
    }
    Ok(BucketKey(entries))
}

fn render_value(value: &KeyValue, source: &BoundSource) -> crate::Result<KeyEntry> {
    let entry = match (value, &source.kind) {
        (KeyValue::Missing, _) => KeyEntry::Null,
        (KeyValue::I64(id), BoundKind::GeotileGrid { .. }) => KeyEntry::Str(geotile::format(*id)),
        (KeyValue::I64(millis), BoundKind::DateHistogram(rounding))
            if rounding.format == DateFormat::Rfc3339 =>
        {
            KeyEntry::Str(format_date_millis(*millis)?)
        }
        (KeyValue::Str(text), _) => KeyEntry::Str(text.clone()),
        (KeyValue::I64(val), _) => KeyEntry::I64(*val),
        (KeyValue::F64(val), _) => KeyEntry::F64(*val),
    };
    Ok(entry)
}
