//! The per-request stage sequence: `DECODING -> RESOLVING ->
//! PARTITION_DECISION -> FIRST_BATCH -> STREAMING -> DONE | ABORTED`.
//!
//! All of this is observability, not control flow — the caller (tonic) only ever
//! sees the `Result<Response<_>, Status>` from `do_get`. `RequestStage` exists so
//! every transition is logged with a consistent vocabulary, rather than ad hoc
//! strings scattered through `lib.rs`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    Decoding,
    Resolving,
    PartitionDecision,
    FirstBatch,
    Streaming,
    Done,
    Aborted,
}

impl fmt::Display for RequestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestStage::Decoding => "DECODING",
            RequestStage::Resolving => "RESOLVING",
            RequestStage::PartitionDecision => "PARTITION_DECISION",
            RequestStage::FirstBatch => "FIRST_BATCH",
            RequestStage::Streaming => "STREAMING",
            RequestStage::Done => "DONE",
            RequestStage::Aborted => "ABORTED",
        };
        f.write_str(s)
    }
}

/// Records a stage transition on the current tracing span.
pub fn enter(stage: RequestStage) {
    tracing::Span::current().record("stage", stage.to_string());
    tracing::trace!(%stage, "request stage transition");
}
