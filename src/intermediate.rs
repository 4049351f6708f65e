//! Per-partition partial results and the cross-partition reducer.
//!
//! Partials are merged with a k-way merge over their already-sorted entry
//! lists; equal keys coalesce by summing doc counts and folding their
//! sub-aggregation states. The merge is associative: reducing partial
//! reductions yields the same result as reducing everything at once.

use itertools::Itertools;

use crate::key::{CompositeKey, CompositeOrdering};
use crate::provider::BucketSink;

/// One partition's contribution: buckets ascending by the composite order,
/// at most `size` of them.
#[derive(Debug)]
pub(crate) struct PartialCompositeResult {
    pub(crate) entries: Vec<(CompositeKey, PartialBucket)>,
    pub(crate) terminated_early: bool,
}

/// A bucket of a partial result.
#[derive(Debug)]
pub(crate) struct PartialBucket {
    pub(crate) doc_count: u64,
    pub(crate) sink: Option<Box<dyn BucketSink>>,
}

/// Merges independently collected partial results into one globally correct
/// top-`size` result. `terminated_early` is true iff any input reported it.
pub(crate) fn reduce(
    partials: Vec<PartialCompositeResult>,
    ordering: &CompositeOrdering,
    size: u32,
) -> crate::Result<PartialCompositeResult> {
    let terminated_early = partials.iter().any(|partial| partial.terminated_early);
    let merged = partials
        .into_iter()
        .map(|partial| partial.entries.into_iter())
        .kmerge_by(|left, right| ordering.cmp(&left.0, &right.0) == std::cmp::Ordering::Less);

    let mut entries: Vec<(CompositeKey, PartialBucket)> = Vec::new();
    for (key, bucket) in merged {
        match entries.last_mut() {
            // the same key reported by several partitions: re-sum
            Some((last_key, last_bucket)) if *last_key == key => {
                last_bucket.doc_count += bucket.doc_count;
                match (&mut last_bucket.sink, bucket.sink) {
                    (Some(merged_sink), Some(other)) => merged_sink.merge(other)?,
                    (None, Some(other)) => last_bucket.sink = Some(other),
                    _ => {}
                }
            }
            _ => {
                if entries.len() as u32 == size {
                    break;
                }
                entries.push((key, bucket));
            }
        }
    }
    Ok(PartialCompositeResult {
        entries,
        terminated_early,
    })
}
