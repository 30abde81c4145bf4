//! The parallel dispatch contract: Ray, thread-pool, and single-threaded
//! backends are three implementations of one `ParallelBackend` contract. This
//! crate ships two: a `tokio::task::JoinSet`-backed thread pool and a sequential
//! single-threaded fallback. A cluster backend (a Ray-style worker pool) is an
//! unimplemented seam behind this same trait — see DESIGN.md.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use fastflight_core::{BatchStream, ErrorKind, FastFlightError, Parameter, Result};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// One contiguous sub-range of the original request, with its own type-erased
/// parameter instance ready to hand to a service's `aget_batches`.
pub struct Partition {
    pub index: usize,
    pub param: Box<dyn Parameter>,
}

/// Produces the batch stream for one partition's parameter, bound to whichever
/// service handles the parent request's tag.
pub type DispatchFn = Arc<dyn Fn(Box<dyn Parameter>) -> BoxFuture<'static, Result<BatchStream>> + Send + Sync>;

/// A backend that fans a set of partitions out to workers and merges their batch
/// streams back into one, honoring the order-preservation contract and the
/// cancellation contract.
#[async_trait::async_trait]
pub trait ParallelBackend: Send + Sync {
    async fn dispatch(&self, partitions: Vec<Partition>, work: DispatchFn, preserve_order: bool, cancel: CancellationToken) -> Result<BatchStream>;
}

/// Sequential fallback: iterates partitions one at a time on the calling task.
/// Trivially preserves order regardless of `preserve_order`, and is the backend
/// used when distributed execution is disabled by config.
pub struct SingleThreadedBackend;

#[async_trait::async_trait]
impl ParallelBackend for SingleThreadedBackend {
    async fn dispatch(&self, partitions: Vec<Partition>, work: DispatchFn, _preserve_order: bool, cancel: CancellationToken) -> Result<BatchStream> {
        let streams_result: Result<Vec<BatchStream>> = {
            let mut streams = Vec::with_capacity(partitions.len());
            for partition in partitions {
                if cancel.is_cancelled() {
                    break;
                }
                match work(partition.param).await {
                    Ok(s) => streams.push(s),
                    Err(e) => {
                        warn!(partition = partition.index, error = %e, "partition failed, skipping");
                    }
                }
            }
            Ok(streams)
        };
        let streams = streams_result?;
        Ok(stream::iter(streams).flatten().boxed())
    }
}

/// A local worker pool: each partition runs as its own tokio task in a
/// `JoinSet`, merged according to `preserve_order`.
pub struct ThreadPoolBackend {
    max_concurrency: usize,
}

impl ThreadPoolBackend {
    pub fn new(max_concurrency: usize) -> Self {
        Self { max_concurrency: max_concurrency.max(1) }
    }
}

enum WorkerMsg {
    Batch { partition: usize, batch: Result<fastflight_core::Batch> },
    Done { partition: usize },
}

#[async_trait::async_trait]
impl ParallelBackend for ThreadPoolBackend {
    async fn dispatch(&self, partitions: Vec<Partition>, work: DispatchFn, preserve_order: bool, cancel: CancellationToken) -> Result<BatchStream> {
        let (tx, rx) = mpsc::channel::<WorkerMsg>(self.max_concurrency.max(4));
        let mut join_set: JoinSet<()> = JoinSet::new();

        for partition in partitions {
            let work = work.clone();
            let tx = tx.clone();
            let cancel = cancel.clone();
            let index = partition.index;
            join_set.spawn(async move {
                let stream_result = work(partition.param).await;
                match stream_result {
                    Ok(mut stream) => {
                        loop {
                            tokio::select! {
                                _ = cancel.cancelled() => break,
                                next = stream.next() => {
                                    match next {
                                        Some(item) => {
                                            if tx.send(WorkerMsg::Batch { partition: index, batch: item }).await.is_err() {
                                                break;
                                            }
                                        }
                                        None => break,
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!(partition = index, error = %e, "partition failed to start, skipping");
                    }
                }
                let _ = tx.send(WorkerMsg::Done { partition: index }).await;
            });
        }
        drop(tx);

        // Detach the JoinSet: tasks observe `cancel` themselves, and this dispatch
        // call returns a stream immediately rather than blocking on every worker.
        tokio::spawn(async move { while join_set.join_next().await.is_some() {} });

        if preserve_order {
            Ok(ordered_merge(rx))
        } else {
            Ok(unordered_merge(rx))
        }
    }
}

fn unordered_merge(mut rx: mpsc::Receiver<WorkerMsg>) -> BoxStream<'static, Result<fastflight_core::Batch>> {
    stream::poll_fn(move |cx| loop {
        match rx.poll_recv(cx) {
            std::task::Poll::Ready(Some(WorkerMsg::Batch { batch, .. })) => return std::task::Poll::Ready(Some(batch)),
            std::task::Poll::Ready(Some(WorkerMsg::Done { .. })) => continue,
            std::task::Poll::Ready(None) => return std::task::Poll::Ready(None),
            std::task::Poll::Pending => return std::task::Poll::Pending,
        }
    })
    .boxed()
}

/// Buffers completed partitions by index and only emits partition `i`'s batches
/// once every partition `< i` has fully drained (the `preserve_order = true`
/// case).
fn ordered_merge(mut rx: mpsc::Receiver<WorkerMsg>) -> BoxStream<'static, Result<fastflight_core::Batch>> {
    let mut pending: HashMap<usize, VecDeque<Result<fastflight_core::Batch>>> = HashMap::new();
    let mut finished: std::collections::HashSet<usize> = std::collections::HashSet::new();
    let mut next_to_emit = 0usize;

    stream::poll_fn(move |cx| loop {
        if let Some(queue) = pending.get_mut(&next_to_emit) {
            if let Some(item) = queue.pop_front() {
                return std::task::Poll::Ready(Some(item));
            }
            if finished.contains(&next_to_emit) {
                pending.remove(&next_to_emit);
                finished.remove(&next_to_emit);
                next_to_emit += 1;
                continue;
            }
        }

        match rx.poll_recv(cx) {
            std::task::Poll::Ready(Some(WorkerMsg::Batch { partition, batch })) => {
                if partition == next_to_emit {
                    return std::task::Poll::Ready(Some(batch));
                }
                pending.entry(partition).or_default().push_back(batch);
            }
            std::task::Poll::Ready(Some(WorkerMsg::Done { partition })) => {
                if partition == next_to_emit && pending.get(&partition).map(VecDeque::is_empty).unwrap_or(true) {
                    pending.remove(&partition);
                    next_to_emit += 1;
                    continue;
                }
                finished.insert(partition);
            }
            std::task::Poll::Ready(None) => {
                if pending.values().all(VecDeque::is_empty) {
                    return std::task::Poll::Ready(None);
                }
                // Channel closed with buffered-but-undelivered partitions ahead of
                // `next_to_emit`: a worker died without sending `Done`. Surface it
                // rather than hanging forever.
                return std::task::Poll::Ready(Some(Err(FastFlightError::new(
                    ErrorKind::Internal,
                    "partition worker channel closed before all partitions finished",
                ))));
            }
            std::task::Poll::Pending => return std::task::Poll::Pending,
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastflight_core::SampleParams;
    use futures::{FutureExt, StreamExt};

    fn make_work(counts: Vec<usize>) -> DispatchFn {
        Arc::new(move |param: Box<dyn Parameter>| {
            let index: usize = param
                .as_any()
                .downcast_ref::<SampleParams>()
                .unwrap()
                .some_field
                .parse()
                .unwrap();
            let n = counts[index];
            async move {
                let batches: Vec<Result<fastflight_core::Batch>> = (0..n).map(|_| Ok(empty_batch())).collect();
                Ok(stream::iter(batches).boxed())
            }
            .boxed()
        })
    }

    fn empty_batch() -> fastflight_core::Batch {
        use datafusion::arrow::array::RecordBatch;
        use datafusion::arrow::datatypes::Schema;
        RecordBatch::new_empty(std::sync::Arc::new(Schema::empty()))
    }

    fn partitions(n: usize) -> Vec<Partition> {
        (0..n)
            .map(|i| Partition { index: i, param: Box::new(SampleParams { some_field: i.to_string() }) })
            .collect()
    }

    #[tokio::test]
    async fn single_threaded_backend_preserves_submission_order() {
        let backend = SingleThreadedBackend;
        let work = make_work(vec![2, 1, 3]);
        let mut stream = backend.dispatch(partitions(3), work, true, CancellationToken::new()).await.unwrap();
        let mut total = 0;
        while stream.next().await.is_some() {
            total += 1;
        }
        assert_eq!(total, 6);
    }

    #[tokio::test]
    async fn thread_pool_backend_preserve_order_emits_all_batches() {
        let backend = ThreadPoolBackend::new(4);
        let work = make_work(vec![2, 1, 3]);
        let mut stream = backend.dispatch(partitions(3), work, true, CancellationToken::new()).await.unwrap();
        let mut total = 0;
        while stream.next().await.is_some() {
            total += 1;
        }
        assert_eq!(total, 6);
    }

    #[tokio::test]
    async fn thread_pool_backend_unordered_emits_all_batches() {
        let backend = ThreadPoolBackend::new(4);
        let work = make_work(vec![2, 1, 3]);
        let mut stream = backend.dispatch(partitions(3), work, false, CancellationToken::new()).await.unwrap();
        let mut total = 0;
        while stream.next().await.is_some() {
            total += 1;
        }
        assert_eq!(total, 6);
    }
}
