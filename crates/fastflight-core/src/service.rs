//! The abstract batch-producing interface every backend (SQL engine, embedded
//! analytic engine, time-series store, synthetic generator) implements for its
//! bound parameter type.

use std::cell::Cell;

use async_trait::async_trait;
use datafusion::arrow::array::RecordBatch;
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::{ErrorKind, FastFlightError, Result};
use crate::param::Parameter;

thread_local! {
    /// Guards against the two default methods bridging into each other forever
    /// when a `ServiceHandler` impl overrides neither — the one case the "at
    /// least one of the two must be implemented" contract forbids. Set for the
    /// duration of one bridge call; a re-entrant default bridge on the same thread
    /// means the other side is also a default, so the second call fails fast
    /// instead of recursing.
    static BRIDGING: Cell<bool> = const { Cell::new(false) };
}

/// Columnar record batch, re-exported from DataFusion's Arrow dependency so every
/// crate in the workspace sees the same Arrow version.
pub type Batch = RecordBatch;

/// A finite, single-pass stream of batches, all sharing one schema.
pub type BatchStream = BoxStream<'static, Result<Batch>>;

/// A finite, single-pass synchronous iterator of batches.
pub type BatchIter = Box<dyn Iterator<Item = Result<Batch>> + Send>;

/// Advisory upper bound on the number of rows a service should put in one batch.
pub type BatchSizeHint = usize;

/// The service contract bound to one parameter type.
///
/// At least one of `get_batches`/`aget_batches` must be overridden; the
/// defaults bridge to whichever form the implementor actually provided, so callers
/// on either side (the streaming server prefers async, the client's blocking API
/// prefers sync) never need to know which one a given service implements.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    /// Synchronous, single-pass batch production.
    ///
    /// Default bridges from [`Self::aget_batches`] via `futures::executor::block_on_stream`,
    /// the cooperative-to-synchronous bridge at the service-contract seam rather
    /// than a dedicated event-loop thread; see DESIGN.md.
    fn get_batches(&self, params: &dyn Parameter, batch_size_hint: BatchSizeHint) -> Result<BatchIter> {
        if BRIDGING.with(Cell::get) {
            return Err(unimplemented_error());
        }
        BRIDGING.with(|b| b.set(true));
        let result = futures::executor::block_on(self.aget_batches(params, batch_size_hint));
        BRIDGING.with(|b| b.set(false));
        let stream = result?;
        Ok(Box::new(futures::executor::block_on_stream(stream)))
    }

    /// Cooperative-async, single-pass batch production.
    ///
    /// Default bridges from [`Self::get_batches`] by running the sync iterator on a
    /// blocking-friendly thread and re-emitting its items as a stream.
    async fn aget_batches(&self, params: &dyn Parameter, batch_size_hint: BatchSizeHint) -> Result<BatchStream> {
        if BRIDGING.with(Cell::get) {
            return Err(unimplemented_error());
        }
        BRIDGING.with(|b| b.set(true));
        let result = self.get_batches(params, batch_size_hint);
        BRIDGING.with(|b| b.set(false));
        Ok(stream::iter(result?).boxed())
    }
}

/// Message embedded in the default implementations' error so a service that
/// overrides neither method fails loudly and distinguishably from a service that
/// genuinely hit an internal error while producing batches.
pub(crate) const UNIMPLEMENTED_MARKER: &str = "neither get_batches nor aget_batches is implemented";

/// Helper for `ServiceHandler` impls that want an explicit "not implemented" error
/// for the form they didn't implement, matching the default's own error shape.
pub fn unimplemented_error() -> FastFlightError {
    FastFlightError::new(ErrorKind::Internal, UNIMPLEMENTED_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::SampleParams;

    struct NeitherImplemented;

    #[async_trait]
    impl ServiceHandler for NeitherImplemented {}

    #[tokio::test]
    async fn neither_method_implemented_fails_fast_instead_of_recursing() {
        let svc = NeitherImplemented;
        let params = SampleParams { some_field: "x".to_string() };

        let err = svc.get_batches(&params, 16).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
        assert!(err.details.contains(UNIMPLEMENTED_MARKER));

        let err = svc.aget_batches(&params, 16).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
        assert!(err.details.contains(UNIMPLEMENTED_MARKER));
    }
}
