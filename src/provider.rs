//! Collaborator traits: where documents, their values, the partition scan
//! order and per-bucket sub-aggregation state come from.

use std::fmt::Debug;

use downcast_rs::{impl_downcast, DowncastSync};

use crate::sources::Order;

/// A document id local to one partition.
pub type DocId = u32;

/// The declared type of a field's values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
    /// UTF-8 strings.
    Str,
    /// Signed integers.
    I64,
    /// Floats.
    F64,
    /// Dates as epoch milliseconds.
    Millis,
    /// WGS84 coordinates.
    GeoPoint,
}

/// A single raw value of a field on one document.
#[derive(Clone, Debug, PartialEq)]
pub enum RawValue {
    /// A string value.
    Str(String),
    /// A signed integer value.
    I64(i64),
    /// A float value.
    F64(f64),
    /// A date as epoch milliseconds.
    Millis(i64),
    /// WGS84 coordinates in degrees.
    GeoPoint {
        /// Latitude, degrees.
        lat: f64,
        /// Longitude, degrees.
        lon: f64,
    },
}

impl RawValue {
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            RawValue::Str(_) => "string",
            RawValue::I64(_) => "long",
            RawValue::F64(_) => "double",
            RawValue::Millis(_) => "date",
            RawValue::GeoPoint { .. } => "geo_point",
        }
    }
}

/// Per-partition read access to document values.
pub trait DocumentValues {
    /// The declared type of `field`, or `None` if the field is unmapped in
    /// this partition.
    fn value_type(&self, field: &str) -> Option<ValueType>;

    /// Fills `out` with the distinct values of `field` on `doc`, sorted in
    /// the type's natural order. `out` must be cleared first; it stays empty
    /// when the document has no value for the field.
    fn values_for_doc(&self, field: &str, doc: DocId, out: &mut Vec<RawValue>)
        -> crate::Result<()>;
}

/// One field of a partition's physical sort order.
#[derive(Clone, Debug, PartialEq)]
pub struct SortField {
    /// The sorted field.
    pub field: String,
    /// Direction of the physical sort.
    pub order: Order,
}

/// An independently scannable slice of the document set (e.g. a segment or
/// shard). Each partition is collected on a single thread with no shared
/// mutable state.
pub trait Partition: Sync {
    /// Value access for this partition's documents.
    fn values(&self) -> &dyn DocumentValues;

    /// The documents of this partition, in physical order. Query matching
    /// happens upstream: only documents visible to the request are yielded.
    fn doc_ids(&self) -> Box<dyn Iterator<Item = DocId> + '_>;

    /// How this partition's physical order is pre-sorted, leading fields
    /// first. Empty when the order is arbitrary.
    fn sort_fields(&self) -> &[SortField] {
        &[]
    }
}

/// Opaque per-bucket accumulator, fed once per surviving document-to-key
/// mapping. The engine only manages its lifecycle: cloned from the blueprint
/// when a bucket is created, dropped with the bucket on eviction, folded
/// across partitions on reduce, and handed back on the emitted bucket.
///
/// Implementations downcast in [`merge`](BucketSink::merge) and when reading
/// the state back from an emitted bucket.
pub trait BucketSink: SinkClone + Debug + DowncastSync {
    /// Accounts for one document mapping to this sink's bucket.
    fn collect(&mut self, doc: DocId) -> crate::Result<()>;

    /// Folds another partition's state for the same bucket into this one.
    fn merge(&mut self, other: Box<dyn BucketSink>) -> crate::Result<()>;
}

impl_downcast!(sync BucketSink);

/// Helper trait to enable cloning of `Box<dyn BucketSink>` (the blueprint
/// pattern: fresh buckets start from a clone of the never-collected
/// blueprint).
pub trait SinkClone {
    /// Clones the sink into a new box.
    fn clone_box(&self) -> Box<dyn BucketSink>;
}

impl<T> SinkClone for T
where T: 'static + BucketSink + Clone
{
    fn clone_box(&self) -> Box<dyn BucketSink> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn BucketSink> {
    fn clone(&self) -> Box<dyn BucketSink> {
        self.clone_box()
    }
}
