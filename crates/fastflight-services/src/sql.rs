//! The SQL service bound to `SqlQueryParams`, backed by a shared DataFusion
//! `SessionContext`. Tables are registered on the context ahead of time (by
//! whoever constructs the service); this service only runs ad hoc queries
//! against whatever is already registered, streaming results batch-by-batch
//! instead of collecting the whole result set first.

use async_trait::async_trait;
use datafusion::prelude::SessionContext;
use fastflight_core::{BatchIter, BatchSizeHint, BatchStream, ErrorKind, FastFlightError, Parameter, Result, ServiceHandler, SqlQueryParams};
use futures::StreamExt;

#[derive(Clone)]
pub struct SqlService {
    ctx: SessionContext,
}

impl SqlService {
    pub fn new(ctx: SessionContext) -> Self {
        Self { ctx }
    }

    fn map_datafusion_err(e: datafusion::error::DataFusionError) -> FastFlightError {
        FastFlightError::with_source(ErrorKind::DataService, e.to_string(), e.into())
    }
}

#[async_trait]
impl ServiceHandler for SqlService {
    async fn aget_batches(&self, params: &dyn Parameter, _batch_size_hint: BatchSizeHint) -> Result<BatchStream> {
        let params = params
            .as_any()
            .downcast_ref::<SqlQueryParams>()
            .ok_or_else(|| FastFlightError::new(ErrorKind::InvalidParam, "sql service requires SqlQueryParams"))?;

        let df = self.ctx.sql(&params.query).await.map_err(Self::map_datafusion_err)?;
        let stream = df.execute_stream().await.map_err(Self::map_datafusion_err)?;
        Ok(stream.map(|r| r.map_err(Self::map_datafusion_err)).boxed())
    }

    fn get_batches(&self, params: &dyn Parameter, batch_size_hint: BatchSizeHint) -> Result<BatchIter> {
        let stream = futures::executor::block_on(self.aget_batches(params, batch_size_hint))?;
        Ok(Box::new(futures::executor::block_on_stream(stream)))
    }
}
