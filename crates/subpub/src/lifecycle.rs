//! # Lifecycle Controller
//!
//! ```text
//! [Open] ──close()──► [Closing] ──workers exited / deadline──► [Closed]
//! ```
//!
//! Only the first `close` drives the transition; later calls return `Ok(())`
//! straight away. New traffic is rejected from the moment the state leaves
//! `Open`. Workers still busy at the deadline are never aborted: there is no
//! safe way to interrupt a callback, so they run to completion in the
//! background.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::bus::BusInner;
use crate::errors::BusError;

/// Lifecycle state of a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BusState {
    /// Accepting subscribes and publishes.
    Open = 0,
    /// `close` is in progress.
    Closing = 1,
    /// Terminal.
    Closed = 2,
}

impl BusState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for BusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Bus state plus the live-worker count close waits on.
pub(crate) struct Lifecycle {
    state: AtomicU8,
    workers: WorkerTracker,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(BusState::Open as u8),
            workers: WorkerTracker::new(),
        }
    }

    pub(crate) fn state(&self) -> BusState {
        BusState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state() == BusState::Open
    }

    pub(crate) fn workers(&self) -> &WorkerTracker {
        &self.workers
    }

    /// `Open -> Closing`. Only one caller ever gets `true`.
    fn begin_close(&self) -> bool {
        self.state
            .compare_exchange(
                BusState::Open as u8,
                BusState::Closing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    fn finish_close(&self) {
        self.state.store(BusState::Closed as u8, Ordering::SeqCst);
    }
}

/// Counts worker tasks that have not exited yet.
///
/// Each worker holds a [`WorkerGuard`]; the count drops when the guard does,
/// including when the task unwinds.
#[derive(Clone)]
pub(crate) struct WorkerTracker {
    live: Arc<watch::Sender<usize>>,
}

impl WorkerTracker {
    pub(crate) fn new() -> Self {
        let (live, _) = watch::channel(0);
        Self {
            live: Arc::new(live),
        }
    }

    pub(crate) fn register(&self) -> WorkerGuard {
        self.live.send_modify(|count| *count += 1);
        WorkerGuard {
            live: Arc::clone(&self.live),
        }
    }

    pub(crate) fn live(&self) -> usize {
        *self.live.borrow()
    }

    /// Resolves once no worker is alive.
    pub(crate) async fn wait_idle(&self) {
        let mut rx = self.live.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

pub(crate) struct WorkerGuard {
    live: Arc<watch::Sender<usize>>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.live
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}

/// Close `bus`, waiting at most `timeout` for its workers.
pub(crate) async fn close<M>(bus: &BusInner<M>, timeout: Duration) -> Result<(), BusError> {
    let lifecycle = bus.lifecycle();
    if !lifecycle.begin_close() {
        return Ok(());
    }

    let workers = bus.registry().drain();
    info!(subscribers = workers.len(), "Closing bus");
    for worker in &workers {
        worker.stop();
    }
    drop(workers);

    let drained = tokio::time::timeout(timeout, lifecycle.workers().wait_idle()).await;
    lifecycle.finish_close();

    match drained {
        Ok(()) => {
            info!("Bus closed");
            Ok(())
        }
        Err(_) => {
            let pending_workers = lifecycle.workers().live();
            warn!(
                timeout = ?timeout,
                pending_workers,
                "Bus closed before all subscriber workers exited"
            );
            Err(BusError::ShutdownDeadlineExceeded {
                timeout,
                pending_workers,
            })
        }
    }
}
