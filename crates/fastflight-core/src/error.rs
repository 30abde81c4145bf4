//! The closed error-kind taxonomy shared by every layer (server, client, gateway).
//!
//! Every boundary in the system converts native errors into a [`FastFlightError`]
//! carrying one of the [`ErrorKind`] variants, preserving the original message in
//! `details`. Retry and circuit-breaker policy operate on kinds, never on native
//! error types.

use std::time::Duration;

use thiserror::Error;

/// The closed set of error kinds that can cross a FastFlight boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadTicket,
    UnknownParamType,
    InvalidParam,
    Unavailable,
    Unauthenticated,
    Forbidden,
    Connection,
    Timeout,
    Serialization,
    DataService,
    ResourceExhausted,
    CircuitOpen,
    RetryExhausted,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadTicket => "BadTicket",
            ErrorKind::UnknownParamType => "UnknownParamType",
            ErrorKind::InvalidParam => "InvalidParam",
            ErrorKind::Unavailable => "Unavailable",
            ErrorKind::Unauthenticated => "Unauthenticated",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::Connection => "Connection",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Serialization => "Serialization",
            ErrorKind::DataService => "DataService",
            ErrorKind::ResourceExhausted => "ResourceExhausted",
            ErrorKind::CircuitOpen => "CircuitOpen",
            ErrorKind::RetryExhausted => "RetryExhausted",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A FastFlight error: a kind plus the original message and optional metadata.
#[derive(Debug, Error)]
#[error("{kind}: {details}")]
pub struct FastFlightError {
    pub kind: ErrorKind,
    pub details: String,
    /// Set only for `CircuitOpen`.
    pub retry_after: Option<Duration>,
    /// Set only for `RetryExhausted`, the kind of the last underlying failure.
    pub last_kind: Option<ErrorKind>,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl FastFlightError {
    pub fn new(kind: ErrorKind, details: impl Into<String>) -> Self {
        Self {
            kind,
            details: details.into(),
            retry_after: None,
            last_kind: None,
            source: None,
        }
    }

    pub fn with_source(kind: ErrorKind, details: impl Into<String>, source: anyhow::Error) -> Self {
        Self {
            kind,
            details: details.into(),
            retry_after: None,
            last_kind: None,
            source: Some(source),
        }
    }

    pub fn circuit_open(retry_after: Duration) -> Self {
        Self {
            kind: ErrorKind::CircuitOpen,
            details: format!("circuit open, retry after {retry_after:?}"),
            retry_after: Some(retry_after),
            last_kind: None,
            source: None,
        }
    }

    pub fn retry_exhausted(attempts: usize, last: FastFlightError) -> Self {
        let last_kind = last.kind;
        Self {
            kind: ErrorKind::RetryExhausted,
            details: format!("exhausted {attempts} attempts, last error: {}", last.details),
            retry_after: None,
            last_kind: Some(last_kind),
            source: Some(anyhow::Error::new(last)),
        }
    }

    /// Maps this error's kind to an HTTP status code for the gateway.
    ///
    /// `UnknownParamType`/`Unavailable` map to 404: a ticket naming an
    /// unregistered tag is a routing miss, not a transient outage (see
    /// DESIGN.md's Open Question decisions for the reasoning).
    pub fn http_status(&self) -> u16 {
        match self.kind {
            ErrorKind::BadTicket | ErrorKind::InvalidParam => 400,
            ErrorKind::UnknownParamType | ErrorKind::Unavailable => 404,
            ErrorKind::Unauthenticated => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::Timeout => 504,
            ErrorKind::ResourceExhausted | ErrorKind::CircuitOpen => 503,
            ErrorKind::Connection
            | ErrorKind::Serialization
            | ErrorKind::DataService
            | ErrorKind::RetryExhausted
            | ErrorKind::Internal => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, FastFlightError>;

impl From<anyhow::Error> for FastFlightError {
    fn from(e: anyhow::Error) -> Self {
        FastFlightError::with_source(ErrorKind::Internal, e.to_string(), e)
    }
}

impl From<serde_json::Error> for FastFlightError {
    fn from(e: serde_json::Error) -> Self {
        FastFlightError::with_source(ErrorKind::Serialization, e.to_string(), e.into())
    }
}
