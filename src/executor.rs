//! Fan-out of partition scans, and the request entry points.

use std::sync::atomic::AtomicBool;

use crossbeam_channel as channel;
use log::error;

use crate::agg_req::CompositeAggregation;
use crate::agg_result::CompositeResult;
use crate::collector::collect_partition;
use crate::error::CompositeError;
use crate::intermediate::{self, PartialCompositeResult};
use crate::provider::{BucketSink, Partition};

/// Executes partition scans on the caller thread or a thread pool.
///
/// The pool is not exposed directly: exposing the API of a dependency risks
/// version conflicts with the client, and the backing implementation may
/// change.
pub enum Executor {
    /// All partitions scanned sequentially on the caller thread.
    SingleThread,
    /// Partitions fan out on a dedicated thread pool.
    ThreadPool(rayon::ThreadPool),
}

impl Executor {
    /// Creates an executor that performs all work on the caller thread.
    pub fn single_thread() -> Executor {
        Executor::SingleThread
    }

    /// Creates an executor dispatching partition scans to a thread pool.
    pub fn multi_thread(num_threads: usize, prefix: &'static str) -> crate::Result<Executor> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(move |num| format!("{prefix}{num}"))
            .build()?;
        Ok(Executor::ThreadPool(pool))
    }

    /// Maps `f` over `args`, preserving order. Panics in tasks propagate to
    /// the caller.
    pub(crate) fn map<A, R, F>(&self, f: F, args: Vec<A>) -> crate::Result<Vec<R>>
    where
        A: Send,
        R: Send,
        F: Sync + Fn(A) -> crate::Result<R>,
    {
        match self {
            Executor::SingleThread => args.into_iter().map(f).collect(),
            Executor::ThreadPool(pool) => {
                let num_fruits = args.len();
                let fruit_receiver = {
                    let (fruit_sender, fruit_receiver) = channel::unbounded();
                    pool.scope(|scope| {
                        for (idx, arg) in args.into_iter().enumerate() {
                            let fruit_sender_ref = &fruit_sender;
                            let f_ref = &f;
                            scope.spawn(move |_| {
                                let fruit = f_ref(arg);
                                if let Err(err) = fruit_sender_ref.send((idx, fruit)) {
                                    error!(
                                        "failed to send partition result; all scan threads have \
                                         likely panicked: {err:?}"
                                    );
                                }
                            });
                        }
                    });
                    fruit_receiver
                    // dropping the sender here lets the receiver iteration
                    // terminate
                };
                let mut results: Vec<Option<R>> =
                    std::iter::repeat_with(|| None).take(num_fruits).collect();
                for (idx, fruit) in fruit_receiver {
                    results[idx] = Some(fruit?);
                }
                results
                    .into_iter()
                    .map(|fruit| {
                        fruit.ok_or_else(|| {
                            CompositeError::InternalError(
                                "a partition scan did not deliver its result".to_string(),
                            )
                        })
                    })
                    .collect()
            }
        }
    }
}

/// Runs a composite aggregation over the given partitions.
///
/// The request is validated and its after key decoded before any document is
/// scanned. Each partition is collected independently (in parallel under a
/// thread-pool executor), then the partial results merge into one globally
/// correct top-`size` page. `sub_aggregation` is the optional per-bucket
/// accumulator blueprint; a fresh clone backs every created bucket.
pub fn execute(
    req: &CompositeAggregation,
    partitions: &[&dyn Partition],
    sub_aggregation: Option<&dyn BucketSink>,
    executor: &Executor,
) -> crate::Result<CompositeResult> {
    execute_inner(req, partitions, sub_aggregation, executor, None)
}

/// Like [`execute`], but scans stop cooperatively at the next document
/// boundary once `cancel` is set. Buckets accumulated up to that point are
/// kept and the result reports `terminated_early`.
pub fn execute_cancellable(
    req: &CompositeAggregation,
    partitions: &[&dyn Partition],
    sub_aggregation: Option<&dyn BucketSink>,
    executor: &Executor,
    cancel: &AtomicBool,
) -> crate::Result<CompositeResult> {
    execute_inner(req, partitions, sub_aggregation, executor, Some(cancel))
}

fn execute_inner(
    req: &CompositeAggregation,
    partitions: &[&dyn Partition],
    sub_aggregation: Option<&dyn BucketSink>,
    executor: &Executor,
    cancel: Option<&AtomicBool>,
) -> crate::Result<CompositeResult> {
    let bound = req.bind(partitions)?;
    let bound_ref = &bound;
    let partials: Vec<PartialCompositeResult> = executor.map(
        |partition| collect_partition(bound_ref, partition, sub_aggregation, cancel),
        partitions.to_vec(),
    )?;
    let merged = intermediate::reduce(partials, &bound.ordering, bound.size)?;
    CompositeResult::from_partial(merged, &bound)
}
