//! Per-partition collection: cross-product key enumeration, bounded top-K
//! retention, after-key pruning and the stop conditions.

use std::cmp::Ordering;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use log::debug;
use smallvec::SmallVec;

use crate::agg_req::BoundRequest;
use crate::heap_map::KeyHeapMap;
use crate::intermediate::{PartialBucket, PartialCompositeResult};
use crate::key::{key_value_ordering, CompositeKey, KeyValue};
use crate::presort;
use crate::provider::{BucketSink, DocId, DocumentValues, Partition, RawValue};

/// Typical number of sources; keys longer than this spill to the heap.
const INLINE_KEY_LEN: usize = 4;

type KeyScratch = SmallVec<[KeyValue; INLINE_KEY_LEN]>;

/// Per-bucket collection state: the doc count plus the opaque
/// sub-aggregation accumulator.
#[derive(Clone, Debug)]
struct BucketState {
    doc_count: u64,
    sink: Option<Box<dyn BucketSink>>,
}

impl BucketState {
    fn new(blueprint: Option<&dyn BucketSink>) -> BucketState {
        BucketState {
            doc_count: 0,
            sink: blueprint.map(|blueprint| blueprint.clone_box()),
        }
    }

    #[inline]
    fn collect(&mut self, doc: DocId) -> crate::Result<()> {
        self.doc_count += 1;
        if let Some(sink) = &mut self.sink {
            sink.collect(doc)?;
        }
        Ok(())
    }
}

/// Collects one partition's documents into the bounded composite bucket
/// table. One instance runs single-threaded to completion per partition.
pub(crate) struct PartitionCompositeCollector<'a> {
    req: &'a BoundRequest,
    blueprint: Option<&'a dyn BucketSink>,
    buckets: KeyHeapMap<BucketState>,
    early_termination: Option<presort::EarlyTermination>,
    terminated_early: bool,
    /// One reusable value buffer per dimension.
    value_scratch: Vec<Vec<RawValue>>,
}

impl<'a> PartitionCompositeCollector<'a> {
    pub(crate) fn new(
        req: &'a BoundRequest,
        blueprint: Option<&'a dyn BucketSink>,
        partition: &dyn Partition,
    ) -> PartitionCompositeCollector<'a> {
        PartitionCompositeCollector {
            req,
            blueprint,
            buckets: KeyHeapMap::new(req.ordering.clone()),
            early_termination: presort::detect(partition.sort_fields(), &req.sources),
            terminated_early: false,
            value_scratch: vec![Vec::new(); req.sources.len()],
        }
    }

    /// Collects one document. Returns `Break` once the partition's physical
    /// order guarantees that no later document can improve the result.
    pub(crate) fn collect_document(
        &mut self,
        doc: DocId,
        values: &dyn DocumentValues,
    ) -> crate::Result<ControlFlow<()>> {
        let req = self.req;
        for (dim, source) in req.sources.iter().enumerate() {
            self.value_scratch[dim].clear();
            values.values_for_doc(&source.field, doc, &mut self.value_scratch[dim])?;
        }

        if self.exceeds_worst_retained()? {
            debug!("partition scan stopped early: leading value exceeds the worst retained key");
            self.terminated_early = true;
            return Ok(ControlFlow::Break(()));
        }

        let mut key = KeyScratch::new();
        self.visit_level(doc, 0, &mut key, req.after.as_ref())?;
        Ok(ControlFlow::Continue(()))
    }

    pub(crate) fn mark_terminated(&mut self) {
        self.terminated_early = true;
    }

    pub(crate) fn into_partial(self) -> PartialCompositeResult {
        PartialCompositeResult {
            entries: self
                .buckets
                .into_sorted_entries()
                .into_iter()
                .map(|(key, state)| {
                    (
                        key,
                        PartialBucket {
                            doc_count: state.doc_count,
                            sink: state.sink,
                        },
                    )
                })
                .collect(),
            terminated_early: self.terminated_early,
        }
    }

    /// The early-termination probe: with the table full and the partition
    /// pre-sorted on the leading dimension, a document whose smallest
    /// leading value ranks strictly after the worst retained key cannot
    /// contribute, and neither can any later document.
    fn exceeds_worst_retained(&self) -> crate::Result<bool> {
        if self.early_termination.is_none() {
            return Ok(false);
        }
        if (self.buckets.len() as u32) < self.req.size {
            return Ok(false);
        }
        let Some(worst) = self.buckets.peek_worst() else {
            return Ok(false);
        };
        let source = &self.req.sources[0];
        let (order, missing_order) = self.req.ordering.dim(0);
        let mut min: Option<KeyValue> = None;
        for raw in &self.value_scratch[0] {
            let value = source.key_of(raw)?;
            min = Some(match min {
                None => value,
                Some(current) => {
                    if key_value_ordering(&value, &current, order, missing_order)
                        == Ordering::Less
                    {
                        value
                    } else {
                        current
                    }
                }
            });
        }
        let Some(min) = min else {
            // no leading value on this document, no signal
            return Ok(false);
        };
        Ok(key_value_ordering(&min, &worst.0[0], order, missing_order) == Ordering::Greater)
    }

    /// Depth-first walk over the per-dimension distinct values, building
    /// every candidate composite key.
    ///
    /// `cursor` is `Some` while the key built so far equals the after key's
    /// prefix: values ranking before the cursor component are pruned, equal
    /// values keep prefix-tracking on, and a leaf reached with the prefix
    /// still equal is the cursor itself, which pagination excludes.
    fn visit_level(
        &mut self,
        doc: DocId,
        level: usize,
        key: &mut KeyScratch,
        cursor: Option<&CompositeKey>,
    ) -> crate::Result<()> {
        if level == self.req.sources.len() {
            if cursor.is_none() {
                self.collect_bucket(doc, key)?;
            }
            return Ok(());
        }

        let raw_values = std::mem::take(&mut self.value_scratch[level]);
        let result = self.visit_values(doc, level, &raw_values, key, cursor);
        self.value_scratch[level] = raw_values;
        result
    }

    fn visit_values(
        &mut self,
        doc: DocId,
        level: usize,
        raw_values: &[RawValue],
        key: &mut KeyScratch,
        cursor: Option<&CompositeKey>,
    ) -> crate::Result<()> {
        let req = self.req;
        let source = &req.sources[level];
        let (order, missing_order) = req.ordering.dim(level);
        for raw in raw_values {
            let value = source.key_of(raw)?;
            let mut next_cursor = None;
            if let Some(cursor) = cursor {
                match key_value_ordering(&value, &cursor.0[level], order, missing_order) {
                    Ordering::Less => continue,
                    Ordering::Equal => next_cursor = Some(cursor),
                    Ordering::Greater => {}
                }
            }
            key.push(value);
            self.visit_level(doc, level + 1, key, next_cursor)?;
            key.pop();
        }
        if raw_values.is_empty() && source.missing_bucket {
            let value = KeyValue::Missing;
            let mut next_cursor = None;
            let mut skip = false;
            if let Some(cursor) = cursor {
                match key_value_ordering(&value, &cursor.0[level], order, missing_order) {
                    Ordering::Less => skip = true,
                    Ordering::Equal => next_cursor = Some(cursor),
                    Ordering::Greater => {}
                }
            }
            if !skip {
                key.push(value);
                self.visit_level(doc, level + 1, key, next_cursor)?;
                key.pop();
            }
        }
        Ok(())
    }

    /// Routes one candidate key into the bounded table: increment an
    /// existing bucket, fill a free slot, or displace the current worst
    /// entry when the candidate ranks before it. Evicted buckets take their
    /// sub-aggregation state with them.
    fn collect_bucket(&mut self, doc: DocId, key: &[KeyValue]) -> crate::Result<()> {
        if let Some(state) = self.buckets.get_mut(key) {
            return state.collect(doc);
        }

        if (self.buckets.len() as u32) < self.req.size {
            let mut state = BucketState::new(self.blueprint);
            state.collect(doc)?;
            self.buckets.insert(CompositeKey(key.to_vec()), state);
            return Ok(());
        }

        let qualifies = match self.buckets.peek_worst() {
            Some(worst) => self.req.ordering.cmp_values(key, &worst.0) == Ordering::Less,
            None => false,
        };
        if qualifies {
            self.buckets.evict_worst();
            let mut state = BucketState::new(self.blueprint);
            state.collect(doc)?;
            self.buckets.insert(CompositeKey(key.to_vec()), state);
        }
        Ok(())
    }
}

/// Runs one partition's scan to completion, early stop, or cooperative
/// cancellation at a document boundary.
pub(crate) fn collect_partition(
    req: &BoundRequest,
    partition: &dyn Partition,
    blueprint: Option<&dyn BucketSink>,
    cancel: Option<&AtomicBool>,
) -> crate::Result<PartialCompositeResult> {
    let mut collector = PartitionCompositeCollector::new(req, blueprint, partition);
    let values = partition.values();
    for doc in partition.doc_ids() {
        if let Some(cancel) = cancel {
            if cancel.load(AtomicOrdering::Relaxed) {
                collector.mark_terminated();
                break;
            }
        }
        if collector.collect_document(doc, values)?.is_break() {
            break;
        }
    }
    Ok(collector.into_partial())
}
