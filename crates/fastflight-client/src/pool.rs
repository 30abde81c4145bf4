//! Bounded connection pool, the direct descendant of `FlightConnectionPool`'s
//! `acquire`/`release` contract, rebuilt on a `tokio::sync::mpsc` channel of
//! ready handles instead of a blocking `Queue`.

use std::time::Duration;

use arrow_flight::flight_service_client::FlightServiceClient;
use fastflight_core::{ErrorKind, FastFlightError, Result};
use tokio::sync::mpsc;
use tonic::transport::Channel;

/// A leased connection. Returning it to the pool on drop would silently swallow
/// connections that are mid-use during a panic, so release is explicit via
/// [`ConnectionPool::release`] instead of a `Drop` impl.
pub type FlightHandle = FlightServiceClient<Channel>;

/// A bounded pool of ready `FlightServiceClient` handles shared across all calls
/// on one client instance; only the acquiring caller may use a handle until
/// release.
pub struct ConnectionPool {
    tx: mpsc::Sender<FlightHandle>,
    rx: tokio::sync::Mutex<mpsc::Receiver<FlightHandle>>,
    size: usize,
}

impl ConnectionPool {
    /// Connects `size` handles to `endpoint` up front and fills the pool.
    pub async fn connect(endpoint: &str, size: usize) -> Result<Self> {
        let (tx, rx) = mpsc::channel(size);
        for _ in 0..size {
            let channel = Channel::from_shared(endpoint.to_string())
                .map_err(|e| FastFlightError::with_source(ErrorKind::InvalidParam, e.to_string(), e.into()))?
                .connect()
                .await
                .map_err(|e| FastFlightError::with_source(ErrorKind::Connection, e.to_string(), e.into()))?;
            let client = FlightServiceClient::new(channel);
            tx.send(client).await.expect("pool channel has capacity for its own fill");
        }
        Ok(Self { tx, rx: tokio::sync::Mutex::new(rx), size })
    }

    /// Builds a pool from pre-built handles, for tests and for callers that manage
    /// their own `Channel` construction (TLS, interceptors, etc).
    pub async fn from_handles(handles: Vec<FlightHandle>) -> Self {
        let size = handles.len();
        let (tx, rx) = mpsc::channel(size.max(1));
        for handle in handles {
            tx.send(handle).await.expect("pool channel has capacity for its own fill");
        }
        Self { tx, rx: tokio::sync::Mutex::new(rx), size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Waits up to `timeout` for a free handle.
    pub async fn acquire(&self, timeout: Duration) -> Result<FlightHandle> {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            handle = rx.recv() => handle.ok_or_else(|| FastFlightError::new(ErrorKind::ResourceExhausted, "connection pool is closed")),
            _ = tokio::time::sleep(timeout) => Err(FastFlightError::new(ErrorKind::ResourceExhausted, format!("timed out acquiring a connection after {timeout:?}"))),
        }
    }

    /// Returns a handle to the pool for reuse.
    pub async fn release(&self, handle: FlightHandle) {
        // The channel was sized to exactly `size` handles; a send only fails if the
        // pool has been closed (receiver dropped), in which case the handle is
        // simply let go.
        let _ = self.tx.send(handle).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_times_out_when_the_pool_is_empty() {
        let pool = ConnectionPool::from_handles(vec![]).await;
        let err = pool.acquire(Duration::from_millis(20)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ResourceExhausted);
    }
}
