//! Service-layer errors and the status codes a transport reports for them.

use std::fmt;

use subpub::BusError;
use thiserror::Error;

/// Status a transport emits to its clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// The request itself is malformed.
    InvalidArgument,
    /// The service is shutting down or closed.
    Unavailable,
    /// The request was valid but could not be served.
    Internal,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by [`PubSubApi`](crate::PubSubApi) operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("bus is closed")]
    BusClosed,

    #[error("failed to publish: {0}")]
    PublishFailed(#[source] BusError),
}

impl ServiceError {
    /// Status code a transport should report for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::InvalidArgument(_) => StatusCode::InvalidArgument,
            ServiceError::BusClosed => StatusCode::Unavailable,
            ServiceError::PublishFailed(_) => StatusCode::Internal,
        }
    }
}

/// Configuration loading errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Tracing initialization errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    Filter(String),

    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}
