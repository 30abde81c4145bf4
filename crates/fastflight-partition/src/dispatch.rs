//! Top-level orchestration of the dispatch strategy: compute worker count,
//! split into partitions, dispatch to a backend, and merge.

use std::sync::Arc;

use fastflight_core::{BatchStream, Parameter, Result};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::backend::{DispatchFn, ParallelBackend, Partition};
use crate::hints::PartitionHints;
use crate::param::TimeSeriesParameter;

/// Runs the partitioned dispatch strategy for `param` against `backend`, invoking
/// `service_call` once per partition. `service_call` is handed a type-erased
/// partition parameter and must return that partition's batch stream.
///
/// Computes the worker count and partition count from `hints`, applies the
/// real-time short-circuit, dispatches, and merges per `hints.preserve_order`.
pub async fn dispatch_time_series<P, F, Fut>(param: &P, hints: &PartitionHints, backend: &dyn ParallelBackend, service_call: F, cancel: CancellationToken) -> Result<BatchStream>
where
    P: TimeSeriesParameter + Clone + 'static,
    F: Fn(Box<dyn Parameter>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<BatchStream>> + Send + 'static,
{
    if let Some(threshold) = hints.real_time_short_circuit {
        let duration = param.time_range_duration()?;
        if duration.to_std().map(|d| d <= threshold).unwrap_or(false) {
            return service_call(Box::new(param.clone())).await;
        }
    }

    let sub_params = param.optimal_partitions(hints.max_workers, hints.target_points_per_partition)?;
    let partitions: Vec<Partition> = sub_params
        .into_iter()
        .enumerate()
        .map(|(index, p)| Partition { index, param: Box::new(p) as Box<dyn Parameter> })
        .collect();

    let work: DispatchFn = Arc::new(move |p| service_call(p).boxed());
    backend.dispatch(partitions, work, hints.preserve_order, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SingleThreadedBackend;
    use datafusion::arrow::array::RecordBatch;
    use datafusion::arrow::datatypes::Schema;
    use fastflight_core::TimeRangeParams;
    use futures::stream::{self, StreamExt};

    fn empty_batch() -> fastflight_core::Batch {
        RecordBatch::new_empty(std::sync::Arc::new(Schema::empty()))
    }

    #[tokio::test]
    async fn short_circuits_ranges_at_or_under_one_hour() {
        let param = TimeRangeParams {
            series_id: "cpu.load".to_string(),
            start: "2026-01-01T00:00:00Z".to_string(),
            end: "2026-01-01T01:00:00Z".to_string(),
            points_per_batch: 4096,
        };
        let backend = SingleThreadedBackend;
        let stream = dispatch_time_series(
            &param,
            &PartitionHints::for_real_time(),
            &backend,
            move |_p| async move { Ok(stream::iter(vec![Ok(empty_batch())]).boxed()) },
            CancellationToken::new(),
        )
        .await
        .unwrap();
        let batches: Vec<_> = stream.collect().await;
        assert_eq!(batches.len(), 1);
    }

    #[tokio::test]
    async fn splits_ranges_longer_than_the_short_circuit_threshold() {
        let param = TimeRangeParams {
            series_id: "cpu.load".to_string(),
            start: "2026-01-01T00:00:00Z".to_string(),
            end: "2026-01-01T05:00:00Z".to_string(),
            points_per_batch: 4096,
        };
        let backend = SingleThreadedBackend;
        let stream = dispatch_time_series(
            &param,
            &PartitionHints::for_real_time(),
            &backend,
            move |_p| async move { Ok(stream::iter(vec![Ok(empty_batch())]).boxed()) },
            CancellationToken::new(),
        )
        .await
        .unwrap();
        let batches: Vec<_> = stream.collect().await;
        // for_real_time has max_workers=2, so the 5-hour range splits into 2 partitions.
        assert_eq!(batches.len(), 2);
    }
}
