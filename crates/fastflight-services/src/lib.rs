//! Concrete `ServiceHandler` backends bound to FastFlight's built-in parameter
//! types: `echo` (in-memory, for tests), `sql` (DataFusion), `duckdb_engine`
//! (embedded analytics via a single dedicated worker thread), and `timeseries`
//! (a synthetic generator standing in for a real time-series store).

pub mod duckdb_engine;
pub mod echo;
pub mod sql;
pub mod timeseries;

pub use duckdb_engine::{DuckDbQueryParams, DuckDbService};
pub use echo::EchoService;
pub use sql::SqlService;
pub use timeseries::TimeSeriesService;

use fastflight_core::Result;

/// Registers every backend shipped by this crate against `registry`, bootstrap
/// code a binary calls once at startup, before the server starts accepting
/// `do_get` calls.
pub fn register_builtin_services(
    registry: &fastflight_core::Registry,
    sql_ctx: datafusion::prelude::SessionContext,
    duckdb_path: Option<String>,
) -> Result<()> {
    registry.register::<fastflight_core::SampleParams, _, _>(EchoService::default)?;
    registry.register::<fastflight_core::TimeRangeParams, _, _>(TimeSeriesService::default)?;

    let sql_service = SqlService::new(sql_ctx);
    registry.register::<fastflight_core::SqlQueryParams, _, _>(move || sql_service.clone())?;

    let duckdb_service = DuckDbService::spawn(duckdb_path)?;
    registry.register::<DuckDbQueryParams, _, _>(move || duckdb_service.clone())?;

    Ok(())
}
