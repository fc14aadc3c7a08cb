//! Delivery counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of a bus's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusStats {
    /// Successful `publish` calls.
    pub published: u64,
    /// Messages placed directly on a subscriber queue.
    pub enqueued: u64,
    /// Messages handed to a background task because a queue was full.
    pub handed_off: u64,
    /// Messages dropped for a subscriber because its queue was full.
    pub dropped: u64,
    /// Callback invocations that returned normally.
    pub delivered: u64,
    /// Callback invocations that panicked.
    pub callback_panics: u64,
}

#[derive(Debug, Default)]
pub(crate) struct BusCounters {
    published: AtomicU64,
    enqueued: AtomicU64,
    handed_off: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    callback_panics: AtomicU64,
}

impl BusCounters {
    pub(crate) fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handed_off(&self) {
        self.handed_off.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_callback_panic(&self) {
        self.callback_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BusStats {
        BusStats {
            published: self.published.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            handed_off: self.handed_off.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            callback_panics: self.callback_panics.load(Ordering::Relaxed),
        }
    }
}
