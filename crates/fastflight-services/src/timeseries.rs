//! The synthetic time-series service bound to `TimeRangeParams`, used by the
//! "time-series partitioning" and "real-time short-circuit" end-to-end scenarios
//! and as a dependency-free stand-in for a real time-series store in
//! integration tests.
//!
//! Generates one deterministic point per second in `[start, end)` for `series_id`,
//! chunked into batches of `points_per_batch` rows. Deterministic generation (a hash
//! of `series_id` and the timestamp, not real randomness) keeps tests reproducible.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use datafusion::arrow::array::{Float64Array, TimestampMillisecondArray};
use datafusion::arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use fastflight_core::{Batch, BatchIter, BatchSizeHint, BatchStream, ErrorKind, FastFlightError, Parameter, Result, TimeRangeParams};
use futures::stream;

#[derive(Debug, Default)]
pub struct TimeSeriesService;

fn schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("ts", DataType::Timestamp(TimeUnit::Millisecond, None), false),
        Field::new("value", DataType::Float64, false),
    ]))
}

/// Deterministic pseudo-value for `(series_id, timestamp_millis)`, stable across
/// runs and processes so tests and partitioned sub-queries agree on the series.
fn synthetic_value(series_id: &str, timestamp_millis: i64) -> f64 {
    let mut hash: u64 = 1469598103934665603; // FNV offset basis
    for byte in series_id.bytes().chain(timestamp_millis.to_le_bytes()) {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    (hash % 10_000) as f64 / 100.0
}

fn generate_batches(params: &TimeRangeParams) -> Result<Vec<Batch>> {
    let start: DateTime<Utc> = params
        .start
        .parse::<DateTime<Utc>>()
        .map_err(|e| FastFlightError::new(ErrorKind::InvalidParam, format!("invalid start: {e}")))?;
    let end: DateTime<Utc> = params
        .end
        .parse::<DateTime<Utc>>()
        .map_err(|e| FastFlightError::new(ErrorKind::InvalidParam, format!("invalid end: {e}")))?;

    let mut timestamps_millis: Vec<i64> = Vec::new();
    let mut cursor = start;
    while cursor < end {
        timestamps_millis.push(cursor.timestamp_millis());
        cursor += chrono::Duration::seconds(1);
    }

    let schema = schema();
    let mut batches = Vec::new();
    for chunk in timestamps_millis.chunks(params.points_per_batch.max(1)) {
        let values: Vec<f64> = chunk.iter().map(|ts| synthetic_value(&params.series_id, *ts)).collect();
        let ts_array = Arc::new(TimestampMillisecondArray::from(chunk.to_vec()));
        let value_array = Arc::new(Float64Array::from(values));
        let batch = Batch::try_new(schema.clone(), vec![ts_array, value_array])
            .map_err(|e| FastFlightError::with_source(ErrorKind::Internal, e.to_string(), e.into()))?;
        batches.push(batch);
    }
    Ok(batches)
}

#[async_trait]
impl fastflight_core::ServiceHandler for TimeSeriesService {
    fn get_batches(&self, params: &dyn Parameter, _batch_size_hint: BatchSizeHint) -> Result<BatchIter> {
        let params = downcast(params)?;
        let batches = generate_batches(params)?;
        Ok(Box::new(batches.into_iter().map(Ok)))
    }

    async fn aget_batches(&self, params: &dyn Parameter, _batch_size_hint: BatchSizeHint) -> Result<BatchStream> {
        let params = downcast(params)?;
        let batches = generate_batches(params)?;
        Ok(Box::pin(stream::iter(batches.into_iter().map(Ok))))
    }
}

fn downcast(params: &dyn Parameter) -> Result<&TimeRangeParams> {
    params
        .as_any()
        .downcast_ref::<TimeRangeParams>()
        .ok_or_else(|| FastFlightError::new(ErrorKind::InvalidParam, "time-series service requires TimeRangeParams"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn params(start: &str, end: &str, points_per_batch: usize) -> TimeRangeParams {
        TimeRangeParams {
            series_id: "cpu.load".to_string(),
            start: start.to_string(),
            end: end.to_string(),
            points_per_batch,
        }
    }

    #[tokio::test]
    async fn chunks_points_into_batches_of_the_requested_size() {
        let svc = TimeSeriesService;
        let p = params("2026-01-01T00:00:00Z", "2026-01-01T00:00:10Z", 4);
        let mut stream = svc.aget_batches(&p, 1024).await.unwrap();

        let mut sizes = Vec::new();
        while let Some(batch) = stream.next().await {
            sizes.push(batch.unwrap().num_rows());
        }
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn same_series_and_timestamp_always_yields_the_same_value() {
        assert_eq!(synthetic_value("cpu.load", 1000), synthetic_value("cpu.load", 1000));
        assert_ne!(synthetic_value("cpu.load", 1000), synthetic_value("mem.used", 1000));
    }
}
