//! The echo service bound to `SampleParams`, used by the end-to-end "echo
//! round-trip" scenario and by integration tests as a minimal, dependency-free
//! `ServiceHandler`.

use async_trait::async_trait;
use datafusion::arrow::array::StringArray;
use datafusion::arrow::datatypes::{DataType, Field, Schema};
use fastflight_core::{Batch, BatchIter, BatchSizeHint, BatchStream, ErrorKind, FastFlightError, Parameter, Result, SampleParams, ServiceHandler};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct EchoService;

impl EchoService {
    fn echo_batch(params: &SampleParams) -> Result<Batch> {
        let schema = Arc::new(Schema::new(vec![Field::new("some_field", DataType::Utf8, false)]));
        let array = Arc::new(StringArray::from(vec![params.some_field.clone()]));
        Batch::try_new(schema, vec![array])
            .map_err(|e| FastFlightError::with_source(ErrorKind::Internal, e.to_string(), e.into()))
    }
}

#[async_trait]
impl ServiceHandler for EchoService {
    fn get_batches(&self, params: &dyn Parameter, _batch_size_hint: BatchSizeHint) -> Result<BatchIter> {
        let params = params
            .as_any()
            .downcast_ref::<SampleParams>()
            .ok_or_else(|| FastFlightError::new(ErrorKind::InvalidParam, "echo service requires SampleParams"))?;
        let batch = Self::echo_batch(params)?;
        Ok(Box::new(std::iter::once(Ok(batch))))
    }

    async fn aget_batches(&self, params: &dyn Parameter, _batch_size_hint: BatchSizeHint) -> Result<BatchStream> {
        let params = params
            .as_any()
            .downcast_ref::<SampleParams>()
            .ok_or_else(|| FastFlightError::new(ErrorKind::InvalidParam, "echo service requires SampleParams"))?;
        let batch = Self::echo_batch(params)?;
        Ok(Box::pin(futures::stream::once(async move { Ok(batch) })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn echoes_the_field_back_as_a_single_batch() {
        let svc = EchoService;
        let params = SampleParams { some_field: "hello".to_string() };
        let mut stream = svc.aget_batches(&params, 1024).await.unwrap();
        let batch = stream.next().await.unwrap().unwrap();
        assert!(stream.next().await.is_none());
        assert_eq!(batch.num_rows(), 1);
        let col = batch.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(col.value(0), "hello");
    }
}
