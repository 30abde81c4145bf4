//! Parameter model: self-describing, content-tagged request descriptors.
//!
//! A parameter type implements [`Parameter`] (the dyn-safe contract the registry and
//! services operate on) and [`ParamTag`] (the compile-time tag used by the typed
//! [`to_bytes`]/[`from_bytes`] helpers). The split exists so that services can accept
//! `&dyn Parameter` without the trait needing `Self: Sized` bounds that would make it
//! non-object-safe, while callers who know the concrete type still get a typed,
//! round-trip-safe encode/decode pair.

use std::any::Any;
use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ErrorKind, FastFlightError, Result};

/// The reserved JSON key carrying a parameter's tag in its canonical serialization.
pub const PARAM_TYPE_KEY: &str = "param_type";

/// Dyn-safe parameter contract. Every concrete parameter type implements this plus
/// [`ParamTag`] plus `serde::{Serialize, Deserialize}`.
pub trait Parameter: std::fmt::Debug + Send + Sync + 'static {
    /// The tag identifying this instance's concrete type, carried as a
    /// `param_type` field in the wire encoding.
    fn param_type(&self) -> &'static str;

    /// Field-level validation: required-ness, numeric ranges, length bounds, enum
    /// membership. Called by [`from_bytes`] after JSON deserialization succeeds.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;
}

/// Compile-time association between a parameter type and its tag, kept separate from
/// [`Parameter`] so the latter stays object-safe.
pub trait ParamTag {
    /// The fully-qualified tag, or an explicitly registered short alias.
    const TAG: &'static str;
}

/// Serializes `p` to its canonical JSON-compatible byte form with `param_type`
/// injected.
pub fn to_bytes<P>(p: &P) -> Result<Vec<u8>>
where
    P: Parameter + ParamTag + Serialize,
{
    let mut value = serde_json::to_value(p)?;
    match &mut value {
        serde_json::Value::Object(map) => {
            if map.contains_key(PARAM_TYPE_KEY) {
                return Err(FastFlightError::new(
                    ErrorKind::Internal,
                    format!("{} field shadows the reserved param_type key", P::TAG),
                ));
            }
            map.insert(PARAM_TYPE_KEY.to_string(), serde_json::Value::String(P::TAG.to_string()));
        }
        _ => {
            return Err(FastFlightError::new(
                ErrorKind::Internal,
                "parameter did not serialize to a JSON object",
            ))
        }
    }
    Ok(serde_json::to_vec(&value)?)
}

/// Parses and validates a parameter of known type `P` from its wire bytes, stripping
/// `param_type` before handing the remaining fields to serde.
pub fn from_bytes<P>(bytes: &[u8]) -> Result<P>
where
    P: Parameter + ParamTag + DeserializeOwned,
{
    let mut value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| FastFlightError::with_source(ErrorKind::BadTicket, e.to_string(), e.into()))?;
    let tag = match &mut value {
        serde_json::Value::Object(map) => map.remove(PARAM_TYPE_KEY).and_then(|v| v.as_str().map(str::to_owned)),
        _ => None,
    }
    .ok_or_else(|| FastFlightError::new(ErrorKind::BadTicket, "ticket missing required param_type key"))?;

    if tag != P::TAG {
        return Err(FastFlightError::new(
            ErrorKind::UnknownParamType,
            format!("ticket tag {tag} does not match expected type {}", P::TAG),
        ));
    }

    let parsed: P = serde_json::from_value(value)
        .map_err(|e| FastFlightError::with_source(ErrorKind::InvalidParam, e.to_string(), e.into()))?;
    parsed.validate()?;
    Ok(parsed)
}

/// Decodes a ticket whose concrete type isn't known at the call site, returning a
/// type-erased [`Parameter`]. Used by the registry's stored decoder.
pub fn decode_erased<P>(bytes: &[u8]) -> Result<Box<dyn Parameter>>
where
    P: Parameter + ParamTag + DeserializeOwned,
{
    Ok(Box::new(from_bytes::<P>(bytes)?))
}

/// Checks that `value` is non-empty after trimming whitespace.
pub fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(FastFlightError::new(
            ErrorKind::InvalidParam,
            format!("field '{field}' is required"),
        ));
    }
    Ok(())
}

/// Checks that `value` falls within `[min, max]` inclusive.
pub fn require_range<T: PartialOrd + std::fmt::Display + Copy>(field: &str, value: T, min: T, max: T) -> Result<()> {
    if value < min || value > max {
        return Err(FastFlightError::new(
            ErrorKind::InvalidParam,
            format!("field '{field}' value {value} out of range [{min}, {max}]"),
        ));
    }
    Ok(())
}

/// Checks that `value` is one of `allowed`.
pub fn require_enum(field: &str, value: &str, allowed: &[&str]) -> Result<()> {
    if !allowed.contains(&value) {
        return Err(FastFlightError::new(
            ErrorKind::InvalidParam,
            format!("field '{field}' value '{value}' not in {allowed:?}"),
        ));
    }
    Ok(())
}

/// Checks that `value.len()` falls within `[min, max]` inclusive.
pub fn require_len_bounds(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(FastFlightError::new(
            ErrorKind::InvalidParam,
            format!("field '{field}' length {len} out of bounds [{min}, {max}]"),
        ));
    }
    Ok(())
}

/// A simple parameter bound to the in-memory echo service used in the end-to-end
/// "echo round-trip" scenario and in integration tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct SampleParams {
    pub some_field: String,
}

impl ParamTag for SampleParams {
    const TAG: &'static str = "fastflight.sample.SampleParams";
}

impl Parameter for SampleParams {
    fn param_type(&self) -> &'static str {
        Self::TAG
    }

    fn validate(&self) -> Result<()> {
        require_non_empty("some_field", &self.some_field)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A SQL-query parameter bound to the DataFusion-backed SQL service
/// (`fastflight-services::sql`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct SqlQueryParams {
    pub query: String,
    #[serde(default = "default_batch_rows")]
    pub batch_rows: usize,
}

fn default_batch_rows() -> usize {
    8192
}

impl ParamTag for SqlQueryParams {
    const TAG: &'static str = "fastflight.sql.SqlQueryParams";
}

impl Parameter for SqlQueryParams {
    fn param_type(&self) -> &'static str {
        Self::TAG
    }

    fn validate(&self) -> Result<()> {
        require_non_empty("query", &self.query)?;
        require_range("batch_rows", self.batch_rows as i64, 1, 10_000_000)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A time-range query bound to the synthetic time-series generator service
/// (`fastflight-services::timeseries`). Large ranges are split into sub-ranges by
/// `fastflight-partition` before being dispatched; `fastflight-partition` implements
/// its `TimeSeriesParameter` trait for this type rather than this crate depending on
/// the partitioner, keeping the dependency direction core -> partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct TimeRangeParams {
    pub series_id: String,
    /// Inclusive start, RFC 3339.
    pub start: String,
    /// Exclusive end, RFC 3339.
    pub end: String,
    #[serde(default = "default_points_per_batch")]
    pub points_per_batch: usize,
}

fn default_points_per_batch() -> usize {
    4096
}

impl ParamTag for TimeRangeParams {
    const TAG: &'static str = "fastflight.timeseries.TimeRangeParams";
}

impl Parameter for TimeRangeParams {
    fn param_type(&self) -> &'static str {
        Self::TAG
    }

    fn validate(&self) -> Result<()> {
        require_non_empty("series_id", &self.series_id)?;
        let start = chrono::DateTime::parse_from_rfc3339(&self.start)
            .map_err(|e| FastFlightError::new(ErrorKind::InvalidParam, format!("field 'start' is not RFC 3339: {e}")))?;
        let end = chrono::DateTime::parse_from_rfc3339(&self.end)
            .map_err(|e| FastFlightError::new(ErrorKind::InvalidParam, format!("field 'end' is not RFC 3339: {e}")))?;
        if end <= start {
            return Err(FastFlightError::new(ErrorKind::InvalidParam, "field 'end' must be after field 'start'"));
        }
        require_range("points_per_batch", self.points_per_batch as i64, 1, 1_000_000)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The closed set of kinds retry/breaker policy may be configured with; re-exported
/// here so parameter/config validation can check membership without importing from
/// the client crate.
pub fn known_error_kind_names() -> HashSet<&'static str> {
    [
        "BadTicket",
        "UnknownParamType",
        "InvalidParam",
        "Unavailable",
        "Unauthenticated",
        "Forbidden",
        "Connection",
        "Timeout",
        "Serialization",
        "DataService",
        "ResourceExhausted",
        "CircuitOpen",
        "RetryExhausted",
        "Internal",
    ]
    .into_iter()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_preserving_fields_and_tag() {
        let p = SampleParams { some_field: "x".to_string() };
        let bytes = to_bytes(&p).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["param_type"], SampleParams::TAG);
        assert_eq!(value.as_object().unwrap().len(), 2);

        let back: SampleParams = from_bytes(&bytes).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn rejects_wrong_tag() {
        let bytes = br#"{"param_type":"not.the.right.tag","some_field":"x"}"#;
        let err = from_bytes::<SampleParams>(bytes).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownParamType);
    }

    #[test]
    fn rejects_missing_param_type() {
        let bytes = br#"{"some_field":"x"}"#;
        let err = from_bytes::<SampleParams>(bytes).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadTicket);
    }

    #[test]
    fn rejects_invalid_fields() {
        let bytes = br#"{"param_type":"fastflight.sample.SampleParams","some_field":""}"#;
        let err = from_bytes::<SampleParams>(bytes).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParam);
    }

    #[test]
    fn time_range_rejects_end_before_start() {
        let p = TimeRangeParams {
            series_id: "cpu.load".to_string(),
            start: "2026-01-02T00:00:00Z".to_string(),
            end: "2026-01-01T00:00:00Z".to_string(),
            points_per_batch: 100,
        };
        let err = p.validate().unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParam);
    }

    #[test]
    fn time_range_accepts_well_formed_range() {
        let p = TimeRangeParams {
            series_id: "cpu.load".to_string(),
            start: "2026-01-01T00:00:00Z".to_string(),
            end: "2026-01-02T00:00:00Z".to_string(),
            points_per_batch: 100,
        };
        assert!(p.validate().is_ok());
    }
}
