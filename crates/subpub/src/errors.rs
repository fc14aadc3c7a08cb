//! # Bus Errors
//!
//! Only two conditions ever reach callers of the bus. Full or closed
//! subscriber queues and panicking callbacks are handled internally.

use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`InMemoryBus`](crate::InMemoryBus) operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus has begun or completed closing.
    ///
    /// Returned by `subscribe` and `publish`. Not retried internally.
    #[error("bus closed")]
    Closed,

    /// `close` gave up waiting for subscriber workers.
    ///
    /// The bus is closed to new traffic regardless; the remaining workers
    /// finish their in-flight callbacks in the background.
    #[error("shutdown deadline of {timeout:?} exceeded with {pending_workers} worker(s) still running")]
    ShutdownDeadlineExceeded {
        /// The timeout the caller passed to `close`.
        timeout: Duration,
        /// Workers that had not exited when the deadline elapsed.
        pending_workers: usize,
    },
}

impl BusError {
    /// True for [`BusError::Closed`].
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}
