//! Transparent partitioner installation: if the decoded parameter is a
//! time-series parameter whose `estimate_data_points()` exceeds the
//! server's configured threshold, the request is served through
//! `fastflight-partition`'s dispatch instead of calling the service directly.

use std::sync::Arc;

use fastflight_core::{BatchStream, Parameter, Result, ServiceHandler, TimeRangeParams};
use fastflight_partition::{dispatch_time_series, PartitionHints, TimeSeriesParameter, ThreadPoolBackend};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Batch size hint passed to services invoked through this bridge. Partitioned
/// sub-queries use each partition's own `points_per_batch` (carried on the cloned
/// sub-parameter); this hint only matters for the non-partitioned direct path.
const DEFAULT_BATCH_SIZE_HINT: usize = 4096;

/// Decides whether to partition `param` and produces the resulting batch stream
/// either way. `param` is only inspected (never consumed) before this function
/// chooses a path, so both branches can use the original decoded value.
pub async fn dispatch(service: Arc<dyn ServiceHandler>, param: Box<dyn Parameter>, partition_threshold_rows: u64, hints: PartitionHints) -> Result<BatchStream> {
    let time_series_param = param.as_any().downcast_ref::<TimeRangeParams>().cloned();

    if let Some(ts_param) = time_series_param {
        if ts_param.estimate_data_points().is_some_and(|points| points > partition_threshold_rows) {
            info!(
                series_id = %ts_param.series_id,
                threshold = partition_threshold_rows,
                "estimated data points exceed partition threshold, dispatching via time-series partitioner"
            );
            let backend = ThreadPoolBackend::new(hints.max_workers);
            let dispatch_service = service.clone();
            return dispatch_time_series(
                &ts_param,
                &hints,
                &backend,
                move |sub_param: Box<dyn Parameter>| {
                    let svc = dispatch_service.clone();
                    async move { svc.aget_batches(sub_param.as_ref(), DEFAULT_BATCH_SIZE_HINT).await }
                },
                CancellationToken::new(),
            )
            .await;
        }
    }

    service.aget_batches(param.as_ref(), DEFAULT_BATCH_SIZE_HINT).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastflight_core::SampleParams;
    use fastflight_services::{EchoService, TimeSeriesService};
    use futures::StreamExt;

    #[tokio::test]
    async fn non_time_series_params_are_dispatched_directly() {
        let service: Arc<dyn ServiceHandler> = Arc::new(EchoService);
        let param: Box<dyn Parameter> = Box::new(SampleParams { some_field: "x".to_string() });

        let mut stream = dispatch(service, param, 1000, PartitionHints::default()).await.unwrap();
        let batch = stream.next().await.unwrap().unwrap();
        assert_eq!(batch.num_rows(), 1);
    }

    #[tokio::test]
    async fn small_time_ranges_stay_under_threshold_and_skip_partitioning() {
        let service: Arc<dyn ServiceHandler> = Arc::new(TimeSeriesService);
        let param: Box<dyn Parameter> = Box::new(TimeRangeParams {
            series_id: "cpu.load".to_string(),
            start: "2026-01-01T00:00:00Z".to_string(),
            end: "2026-01-01T00:00:05Z".to_string(),
            points_per_batch: 4096,
        });

        let mut stream = dispatch(service, param, 1_000_000, PartitionHints::default()).await.unwrap();
        let mut rows = 0;
        while let Some(batch) = stream.next().await {
            rows += batch.unwrap().num_rows();
        }
        assert_eq!(rows, 5);
    }

    #[tokio::test]
    async fn large_time_ranges_are_split_and_fully_covered() {
        let service: Arc<dyn ServiceHandler> = Arc::new(TimeSeriesService);
        let param: Box<dyn Parameter> = Box::new(TimeRangeParams {
            series_id: "cpu.load".to_string(),
            start: "2026-01-01T00:00:00Z".to_string(),
            end: "2026-01-01T01:00:00Z".to_string(),
            points_per_batch: 4096,
        });

        // 3600 points > the threshold of 1000, so this goes through the partitioner.
        let mut stream = dispatch(service, param, 1_000, PartitionHints::historical()).await.unwrap();
        let mut rows = 0;
        while let Some(batch) = stream.next().await {
            rows += batch.unwrap().num_rows();
        }
        assert_eq!(rows, 3600);
    }
}
