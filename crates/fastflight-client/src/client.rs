//! The public client API: each operation has a cooperative-async form and a
//! blocking form, backed by the same pool and resilience composition. All
//! operations accept either serialized ticket bytes or a `Parameter` instance.

use std::sync::Arc;

use arrow_flight::decode::FlightRecordBatchStream;
use arrow_flight::Ticket;
use datafusion::arrow::array::RecordBatch;
use datafusion::arrow::compute::concat_batches;
use datafusion::prelude::{DataFrame, SessionContext};
use fastflight_core::{ClientPoolConfig, ErrorKind, FastFlightError, ParamTag, Parameter, Result};
use futures::StreamExt;
use tonic::Request;

use crate::breaker::CircuitBreakerRegistry;
use crate::pool::ConnectionPool;
use crate::resilience::execute_with_resilience;

/// A resilient, pooled Arrow Flight client: wraps ticket construction, pool
/// acquire/release, and breaker+retry composition behind four request shapes.
pub struct FastFlightClient {
    pool: ConnectionPool,
    config: ClientPoolConfig,
    breakers: CircuitBreakerRegistry,
    /// The circuit name calls are grouped under; one breaker per client instance
    /// is sufficient since a client talks to exactly one Flight endpoint.
    circuit_name: String,
}

impl FastFlightClient {
    pub async fn connect(endpoint: &str, config: ClientPoolConfig) -> Result<Self> {
        let pool = ConnectionPool::connect(endpoint, config.pool_size).await?;
        Ok(Self { pool, config, breakers: CircuitBreakerRegistry::new(), circuit_name: endpoint.to_string() })
    }

    /// Builds a client around a caller-assembled pool, for callers that need
    /// custom `Channel` construction (TLS, interceptors) or, in tests, an empty
    /// pool that never dials out.
    pub fn from_pool(pool: ConnectionPool, config: ClientPoolConfig, circuit_name: impl Into<String>) -> Self {
        Self { pool, config, breakers: CircuitBreakerRegistry::new(), circuit_name: circuit_name.into() }
    }

    fn ticket_bytes<P>(params: &P) -> Result<Vec<u8>>
    where
        P: Parameter + ParamTag + serde::Serialize,
    {
        fastflight_core::param::to_bytes(params)
    }

    /// Raw bytes over the wire, decoded into a stream of `RecordBatch`es.
    pub async fn get_stream_reader_bytes(&self, ticket_bytes: Vec<u8>) -> Result<impl futures::Stream<Item = Result<RecordBatch>> + Send> {
        let config = self.config.clone();
        let pool = &self.pool;
        let circuit_name = self.circuit_name.clone();

        let flight_stream = execute_with_resilience(&config, &self.breakers, &circuit_name, || {
            let ticket_bytes = ticket_bytes.clone();
            async {
                let mut handle = pool.acquire(self.config.acquire_timeout()).await?;
                let response = handle
                    .do_get(Request::new(Ticket { ticket: ticket_bytes.into() }))
                    .await
                    .map_err(map_tonic_status)?;
                pool.release(handle).await;
                Ok(response.into_inner())
            }
        })
        .await?;

        let decoded = FlightRecordBatchStream::new_from_flight_data(flight_stream.map(|r| r.map_err(Into::into)));
        Ok(decoded.map(|r| r.map_err(|e| FastFlightError::with_source(ErrorKind::Serialization, e.to_string(), e.into()))))
    }

    pub async fn get_stream_reader<P>(&self, params: &P) -> Result<impl futures::Stream<Item = Result<RecordBatch>> + Send>
    where
        P: Parameter + ParamTag + serde::Serialize,
    {
        self.get_stream_reader_bytes(Self::ticket_bytes(params)?).await
    }

    /// Collects the full stream into one concatenated `RecordBatch`, the Rust
    /// analogue of PyArrow's `Table`.
    pub async fn get_table<P>(&self, params: &P) -> Result<RecordBatch>
    where
        P: Parameter + ParamTag + serde::Serialize,
    {
        let mut stream = Box::pin(self.get_stream_reader(params).await?);
        let mut batches = Vec::new();
        let mut schema = None;
        while let Some(batch) = stream.next().await {
            let batch = batch?;
            if schema.is_none() {
                schema = Some(batch.schema());
            }
            batches.push(batch);
        }
        let schema = schema.ok_or_else(|| FastFlightError::new(ErrorKind::DataService, "stream produced no batches"))?;
        concat_batches(&schema, &batches).map_err(|e| FastFlightError::with_source(ErrorKind::Internal, e.to_string(), e.into()))
    }

    /// Registers the result as an in-memory table on `ctx` and returns a DataFusion
    /// `DataFrame` over it, the ecosystem's native columnar dataframe type.
    pub async fn get_dataframe<P>(&self, ctx: &SessionContext, table_name: &str, params: &P) -> Result<DataFrame>
    where
        P: Parameter + ParamTag + serde::Serialize,
    {
        let batch = self.get_table(params).await?;
        ctx.register_batch(table_name, batch)
            .map_err(|e| FastFlightError::with_source(ErrorKind::Internal, e.to_string(), e.into()))?;
        ctx.table(table_name).await.map_err(|e| FastFlightError::with_source(ErrorKind::Internal, e.to_string(), e.into()))
    }

    /// Forwards each Flight message's content verbatim, without decoding into
    /// `RecordBatch`es, but re-frames it as a proper Arrow IPC stream message
    /// (continuation marker, padded metadata length, metadata, body) followed by
    /// an EOS marker, so the HTTP gateway's passthrough route can hand the bytes
    /// straight to an Arrow IPC stream reader.
    pub async fn get_byte_stream(&self, ticket_bytes: Vec<u8>) -> Result<impl futures::Stream<Item = Result<bytes::Bytes>> + Send> {
        let config = self.config.clone();
        let pool = &self.pool;
        let circuit_name = self.circuit_name.clone();

        let flight_stream = execute_with_resilience(&config, &self.breakers, &circuit_name, || {
            let ticket_bytes = ticket_bytes.clone();
            async {
                let mut handle = pool.acquire(self.config.acquire_timeout()).await?;
                let response = handle
                    .do_get(Request::new(Ticket { ticket: ticket_bytes.into() }))
                    .await
                    .map_err(map_tonic_status)?;
                pool.release(handle).await;
                Ok(response.into_inner())
            }
        })
        .await?;

        let framed = flight_stream.map(|item| {
            let flight_data = item.map_err(map_tonic_status)?;
            Ok(encapsulate_message(&flight_data.data_header, &flight_data.data_body))
        });
        Ok(framed.chain(futures::stream::once(async { Ok(eos_marker()) })))
    }

    /// Blocking variant of [`Self::get_table`], backed by a dedicated single-thread
    /// `tokio::Runtime` event-loop thread, to avoid creating a fresh loop per call.
    pub fn get_table_blocking<P>(&self, runtime: &BlockingBridge, params: &P) -> Result<RecordBatch>
    where
        P: Parameter + ParamTag + serde::Serialize,
    {
        runtime.handle().block_on(self.get_table(params))
    }

    /// Blocking variant of [`Self::get_stream_reader`].
    pub fn get_stream_reader_blocking<P>(
        &self,
        runtime: &BlockingBridge,
        params: &P,
    ) -> Result<impl futures::Stream<Item = Result<RecordBatch>> + Send>
    where
        P: Parameter + ParamTag + serde::Serialize,
    {
        runtime.handle().block_on(self.get_stream_reader(params))
    }

    /// Blocking variant of [`Self::get_dataframe`].
    pub fn get_dataframe_blocking<P>(
        &self,
        runtime: &BlockingBridge,
        ctx: &SessionContext,
        table_name: &str,
        params: &P,
    ) -> Result<DataFrame>
    where
        P: Parameter + ParamTag + serde::Serialize,
    {
        runtime.handle().block_on(self.get_dataframe(ctx, table_name, params))
    }

    /// Blocking variant of [`Self::get_byte_stream`].
    pub fn get_byte_stream_blocking(
        &self,
        runtime: &BlockingBridge,
        ticket_bytes: Vec<u8>,
    ) -> Result<impl futures::Stream<Item = Result<bytes::Bytes>> + Send> {
        runtime.handle().block_on(self.get_byte_stream(ticket_bytes))
    }
}

/// Marks the start of an encapsulated IPC message, per the Arrow streaming format.
const CONTINUATION_MARKER: [u8; 4] = [0xff, 0xff, 0xff, 0xff];

/// Re-frames one Flight message's header/body as a self-delimited IPC stream
/// message: a continuation marker, a little-endian metadata length padded so the
/// whole prefix is 8-byte aligned, the metadata itself (zero-padded to that
/// length), then the body.
fn encapsulate_message(header: &[u8], body: &[u8]) -> bytes::Bytes {
    let unpadded_len = 8 + header.len();
    let padded_len = (unpadded_len + 7) / 8 * 8;
    let metadata_size = (padded_len - 8) as i32;

    let mut out = Vec::with_capacity(padded_len + body.len());
    out.extend_from_slice(&CONTINUATION_MARKER);
    out.extend_from_slice(&metadata_size.to_le_bytes());
    out.extend_from_slice(header);
    out.resize(padded_len, 0);
    out.extend_from_slice(body);
    bytes::Bytes::from(out)
}

/// The end-of-stream marker: a continuation marker followed by a zero length.
fn eos_marker() -> bytes::Bytes {
    let mut out = Vec::with_capacity(8);
    out.extend_from_slice(&CONTINUATION_MARKER);
    out.extend_from_slice(&0i32.to_le_bytes());
    bytes::Bytes::from(out)
}

fn map_tonic_status(status: tonic::Status) -> FastFlightError {
    let kind = match status.code() {
        tonic::Code::Unauthenticated => ErrorKind::Unauthenticated,
        tonic::Code::PermissionDenied => ErrorKind::Forbidden,
        tonic::Code::Unavailable => ErrorKind::Unavailable,
        tonic::Code::DeadlineExceeded => ErrorKind::Timeout,
        tonic::Code::InvalidArgument => ErrorKind::InvalidParam,
        tonic::Code::ResourceExhausted => ErrorKind::ResourceExhausted,
        _ => ErrorKind::Connection,
    };
    FastFlightError::new(kind, status.message().to_string())
}

/// A dedicated single-thread Tokio runtime backing the client's blocking API
/// surface, an event-loop-thread bridge for synchronous callers.
pub struct BlockingBridge {
    runtime: tokio::runtime::Runtime,
}

impl BlockingBridge {
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| FastFlightError::with_source(ErrorKind::Internal, e.to_string(), e.into()))?;
        Ok(Self { runtime })
    }

    pub fn handle(&self) -> &tokio::runtime::Handle {
        self.runtime.handle()
    }
}

#[allow(dead_code)]
fn _assert_send<T: Send>() {}

/// Convenience constructor kept next to [`FastFlightClient::connect`] so call sites
/// needing both the client and its blocking bridge can build them together.
pub async fn connect_with_blocking_bridge(endpoint: &str, config: ClientPoolConfig) -> Result<(Arc<FastFlightClient>, BlockingBridge)> {
    let client = Arc::new(FastFlightClient::connect(endpoint, config).await?);
    let bridge = BlockingBridge::new()?;
    Ok((client, bridge))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encapsulated_message_is_continuation_prefixed_and_8_byte_aligned() {
        let header = vec![1, 2, 3];
        let body = vec![9, 9, 9, 9, 9];
        let framed = encapsulate_message(&header, &body);

        assert_eq!(&framed[0..4], &CONTINUATION_MARKER);
        let metadata_size = i32::from_le_bytes(framed[4..8].try_into().unwrap());
        assert_eq!((8 + metadata_size as usize) % 8, 0);
        assert!(metadata_size as usize >= header.len());

        let metadata_end = 8 + metadata_size as usize;
        assert_eq!(&framed[8..8 + header.len()], header.as_slice());
        assert_eq!(&framed[metadata_end..], body.as_slice());
    }

    #[test]
    fn eos_marker_is_continuation_followed_by_zero_length() {
        let marker = eos_marker();
        assert_eq!(marker.len(), 8);
        assert_eq!(&marker[0..4], &CONTINUATION_MARKER);
        assert_eq!(&marker[4..8], &0i32.to_le_bytes());
    }
}
