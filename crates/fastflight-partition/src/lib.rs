//! Time-series partitioning: the `TimeSeriesParameter` contract, partition math,
//! the `ParallelBackend` dispatch contract and its two built-in implementations,
//! optimization hint presets, and the dispatch-strategy orchestration that ties
//! them together.

pub mod backend;
pub mod dispatch;
pub mod hints;
pub mod param;

pub use backend::{DispatchFn, ParallelBackend, Partition, SingleThreadedBackend, ThreadPoolBackend};
pub use dispatch::dispatch_time_series;
pub use hints::PartitionHints;
pub use param::TimeSeriesParameter;
