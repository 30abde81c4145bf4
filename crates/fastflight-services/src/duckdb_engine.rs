//! The embedded-analytics service bound to `DuckDbQueryParams`.
//!
//! DuckDB's embedded connections are not safe to share across threads without
//! external synchronization, and opening a fresh connection per query defeats
//! caching and is slow. This service instead funnels every query through one
//! dedicated OS thread that owns a single `duckdb::Connection` for the service's
//! whole lifetime, and streams result batches back as DuckDB produces them rather
//! than collecting the full result set before returning the first one.

use std::any::Any;
use std::sync::mpsc as std_mpsc;
use std::thread;

use async_trait::async_trait;
use fastflight_core::{Batch, BatchIter, BatchSizeHint, BatchStream, ErrorKind, FastFlightError, ParamTag, Parameter, Result};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc as tokio_mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// A query bound to the embedded DuckDB backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuckDbQueryParams {
    pub query: String,
}

impl ParamTag for DuckDbQueryParams {
    const TAG: &'static str = "fastflight.duckdb.DuckDbQueryParams";
}

impl Parameter for DuckDbQueryParams {
    fn param_type(&self) -> &'static str {
        Self::TAG
    }

    fn validate(&self) -> Result<()> {
        fastflight_core::param::require_non_empty("query", &self.query)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct Job {
    query: String,
    tx: tokio_mpsc::Sender<Result<Batch>>,
}

/// Bounded channel depth for a worker's result stream: enough to keep the worker
/// thread ahead of a slow consumer without buffering an unbounded result set.
const RESULT_CHANNEL_DEPTH: usize = 4;

#[derive(Clone)]
pub struct DuckDbService {
    jobs: std_mpsc::SyncSender<Job>,
}

impl DuckDbService {
    /// Spawns the dedicated worker thread and opens `path` (or an in-memory
    /// database when `None`).
    pub fn spawn(path: Option<String>) -> Result<Self> {
        let (jobs_tx, jobs_rx) = std_mpsc::sync_channel::<Job>(16);

        let conn = match &path {
            Some(p) => duckdb::Connection::open(p),
            None => duckdb::Connection::open_in_memory(),
        }
        .map_err(|e| FastFlightError::with_source(ErrorKind::DataService, format!("opening duckdb: {e}"), e.into()))?;

        thread::Builder::new()
            .name("fastflight-duckdb-worker".to_string())
            .spawn(move || worker_loop(conn, jobs_rx))
            .map_err(|e| FastFlightError::with_source(ErrorKind::Internal, format!("spawning duckdb worker: {e}"), e.into()))?;

        Ok(Self { jobs: jobs_tx })
    }
}

fn worker_loop(conn: duckdb::Connection, jobs_rx: std_mpsc::Receiver<Job>) {
    while let Ok(job) = jobs_rx.recv() {
        run_one_query(&conn, &job.query, &job.tx);
    }
}

fn run_one_query(conn: &duckdb::Connection, query: &str, tx: &tokio_mpsc::Sender<Result<Batch>>) {
    let mut stmt = match conn.prepare(query) {
        Ok(stmt) => stmt,
        Err(e) => {
            let _ = tx.blocking_send(Err(FastFlightError::with_source(ErrorKind::DataService, e.to_string(), e.into())));
            return;
        }
    };

    let arrow_result = stmt.query_arrow([]);
    let arrow_iter = match arrow_result {
        Ok(iter) => iter,
        Err(e) => {
            let _ = tx.blocking_send(Err(FastFlightError::with_source(ErrorKind::DataService, e.to_string(), e.into())));
            return;
        }
    };

    for batch in arrow_iter {
        if tx.blocking_send(Ok(batch)).is_err() {
            // Receiver dropped (client disconnected mid-stream); stop producing.
            return;
        }
    }
}

#[async_trait]
impl fastflight_core::ServiceHandler for DuckDbService {
    async fn aget_batches(&self, params: &dyn Parameter, _batch_size_hint: BatchSizeHint) -> Result<BatchStream> {
        let params = params
            .as_any()
            .downcast_ref::<DuckDbQueryParams>()
            .ok_or_else(|| FastFlightError::new(ErrorKind::InvalidParam, "duckdb service requires DuckDbQueryParams"))?;

        let (tx, rx) = tokio_mpsc::channel(RESULT_CHANNEL_DEPTH);
        let job = Job { query: params.query.clone(), tx };
        let jobs = self.jobs.clone();

        tokio::task::spawn_blocking(move || jobs.send(job))
            .await
            .map_err(|e| FastFlightError::with_source(ErrorKind::Internal, e.to_string(), e.into()))?
            .map_err(|_| FastFlightError::new(ErrorKind::Unavailable, "duckdb worker thread is gone"))?;

        Ok(ReceiverStream::new(rx).boxed())
    }

    fn get_batches(&self, params: &dyn Parameter, batch_size_hint: BatchSizeHint) -> Result<BatchIter> {
        let stream = futures::executor::block_on(self.aget_batches(params, batch_size_hint))?;
        Ok(Box::new(futures::executor::block_on_stream(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn streams_rows_from_an_in_memory_database() {
        let svc = DuckDbService::spawn(None).unwrap();
        let params = DuckDbQueryParams { query: "SELECT 1 AS n UNION ALL SELECT 2".to_string() };
        let mut stream = svc.aget_batches(&params, 1024).await.unwrap();
        let mut total_rows = 0;
        while let Some(batch) = stream.next().await {
            total_rows += batch.unwrap().num_rows();
        }
        assert_eq!(total_rows, 2);
    }

    #[tokio::test]
    async fn bad_sql_surfaces_as_data_service_error() {
        let svc = DuckDbService::spawn(None).unwrap();
        let params = DuckDbQueryParams { query: "NOT VALID SQL".to_string() };
        let mut stream = svc.aget_batches(&params, 1024).await.unwrap();
        let first = stream.next().await.unwrap();
        assert_eq!(first.unwrap_err().kind, ErrorKind::DataService);
    }
}
