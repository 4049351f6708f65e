#![warn(missing_docs)]
//! # composite-agg
//!
//! A composite multi-dimensional bucket aggregation engine with keyset
//! pagination.
//!
//! Documents expose one or more typed values per configured dimension
//! ("source"); the engine groups them into buckets keyed by the tuple of
//! per-source values, orders the buckets by a deterministic composite
//! ordering, and pages through them with an opaque `after_key` instead of
//! offset/limit. Collection keeps only the top `size` keys per partition (a
//! bounded keyed heap, no global sort), stops scanning pre-sorted partitions
//! early, and merges the per-partition partial results into one globally
//! correct page.
//!
//! Storage, query matching and sub-aggregation execution stay behind the
//! collaborator traits in [`provider`]: implement [`Partition`] and
//! [`DocumentValues`] over your document store, optionally hand in a
//! [`BucketSink`] blueprint for per-bucket accumulation, and call
//! [`execute`].
//!
//! ## Sources
//!
//! - [`TermsSource`]: buckets by the field's native values.
//! - [`HistogramSource`]: fixed-width numeric intervals.
//! - [`DateHistogramSource`]: fixed or calendar intervals over epoch
//!   milliseconds, evaluated in a time zone and optionally shifted.
//! - [`GeoTileGridSource`]: web-mercator tiles at a fixed zoom.
//!
//! Each source carries its own direction, and documents without a value can
//! form an explicit `null` bucket whose placement is configurable.
//!
//! ## JSON format
//!
//! Requests and results de/serialize into Elasticsearch-compatible JSON:
//!
//! ```
//! use composite_agg::CompositeAggregation;
//!
//! let req: CompositeAggregation = serde_json::from_value(serde_json::json!({
//!     "sources": [
//!         {"category": {"terms": {"field": "category"}}},
//!         {"day": {"date_histogram": {"field": "ts", "calendar_interval": "day"}}}
//!     ],
//!     "size": 10,
//!     "after": {"category": "books", "day": 1508457600000i64}
//! })).unwrap();
//! assert_eq!(req.sources.len(), 2);
//! req.validate().unwrap();
//! ```
//!
//! A result serializes as an ordered bucket list plus the cursor for the
//! next page:
//!
//! ```json
//! {
//!   "buckets": [
//!     {"key": {"category": "electronics", "day": 1508457600000}, "doc_count": 3}
//!   ],
//!   "after_key": {"category": "electronics", "day": 1508457600000},
//!   "terminated_early": false
//! }
//! ```
//!
//! ## Pagination
//!
//! Passing a page's `after_key` back as `after` returns the buckets
//! strictly after that key. Collecting `s1 + s2` buckets in one request and
//! collecting `s1` then `s2` across two requests yield the same sequence;
//! every request is stateless given its cursor.

pub mod agg_req;
pub mod agg_result;
mod after_key;
mod collector;
mod date;
mod error;
mod executor;
mod heap_map;
mod intermediate;
mod key;
mod presort;
pub mod provider;
pub mod sources;


pub use agg_req::{CompositeAggregation, DEFAULT_SIZE};
pub use agg_result::{BucketKey, CompositeBucket, CompositeResult, KeyEntry};
pub use error::CompositeError;
pub use executor::{execute, execute_cancellable, Executor};
pub use key::{CompositeKey, CompositeOrdering, KeyValue};
pub use provider::{
    BucketSink, DocId, DocumentValues, Partition, RawValue, SinkClone, SortField, ValueType,
};
pub use sources::{
    CalendarInterval, DateFormat, DateHistogramSource, DurationParseError, GeoTileGridSource,
    HistogramSource, MissingOrder, Order, SourceSpec, TermsSource,
};

/// The crate's result type.
pub type Result<T> = std::result::Result<T, CompositeError>;
