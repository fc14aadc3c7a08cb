//! # Subscriber Worker
//!
//! One worker per subscription: a bounded queue, a stop signal and a
//! dedicated task that runs the handler against queued messages in order.
//!
//! ```text
//!  dispatcher ──offer()──► [bounded queue] ──► worker task ──► handler.handle_shared(msg)
//!                                                  ▲
//!  unsubscribe / close ──stop()──► [stop signal] ──┘
//! ```
//!
//! The stop signal always wins over queued messages: once a worker has
//! observed it, no further handler invocation starts. A handler that is
//! already running when the signal arrives finishes normally.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, trace};
use uuid::Uuid;

use crate::handler::MessageHandler;
use crate::lifecycle::{WorkerGuard, WorkerTracker};
use crate::stats::BusCounters;

/// Identifier of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Result of a non-blocking enqueue attempt.
pub(crate) enum Offer<M> {
    Accepted,
    /// Queue at capacity; the message is handed back.
    Full(Arc<M>),
    /// Worker stopped or gone.
    Closed,
}

/// Registry-side half of a subscriber: queue sender plus stop signal.
pub(crate) struct SubscriberWorker<M> {
    id: SubscriptionId,
    subject: String,
    sender: mpsc::Sender<Arc<M>>,
    stop_tx: watch::Sender<bool>,
    handoffs: Arc<AtomicUsize>,
}

impl<M> SubscriberWorker<M> {
    pub(crate) fn id(&self) -> SubscriptionId {
        self.id
    }

    pub(crate) fn subject(&self) -> &str {
        &self.subject
    }

    /// Try to enqueue without waiting.
    pub(crate) fn offer(&self, message: Arc<M>) -> Offer<M> {
        if self.is_stopped() {
            return Offer::Closed;
        }
        match self.sender.try_send(message) {
            Ok(()) => Offer::Accepted,
            Err(mpsc::error::TrySendError::Full(message)) => Offer::Full(message),
            Err(mpsc::error::TrySendError::Closed(_)) => Offer::Closed,
        }
    }

    /// Sender clone for an asynchronous handoff.
    pub(crate) fn sender(&self) -> mpsc::Sender<Arc<M>> {
        self.sender.clone()
    }

    /// Counter of handoffs currently waiting for queue space.
    pub(crate) fn handoffs(&self) -> &Arc<AtomicUsize> {
        &self.handoffs
    }

    /// Signal the worker task to exit. Idempotent.
    pub(crate) fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub(crate) fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }
}

impl<M> SubscriberWorker<M>
where
    M: Send + Sync + 'static,
{
    /// Create the queue and spawn the processing task on `runtime`.
    ///
    /// The worker is counted by `tracker` before this returns, so a
    /// concurrent close always waits for it.
    pub(crate) fn spawn(
        id: SubscriptionId,
        subject: String,
        handler: Arc<dyn MessageHandler<M>>,
        capacity: usize,
        runtime: &Handle,
        tracker: &WorkerTracker,
        counters: Arc<BusCounters>,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (stop_tx, stop_rx) = watch::channel(false);
        let guard = tracker.register();

        runtime.spawn(process(
            id,
            subject.clone(),
            receiver,
            stop_rx,
            handler,
            counters,
            guard,
        ));

        Arc::new(Self {
            id,
            subject,
            sender,
            stop_tx,
            handoffs: Arc::new(AtomicUsize::new(0)),
        })
    }
}

/// Processing loop of one subscriber.
async fn process<M>(
    id: SubscriptionId,
    subject: String,
    mut receiver: mpsc::Receiver<Arc<M>>,
    mut stop_rx: watch::Receiver<bool>,
    handler: Arc<dyn MessageHandler<M>>,
    counters: Arc<BusCounters>,
    _guard: WorkerGuard,
) where
    M: Send + Sync + 'static,
{
    trace!(subject = %subject, subscription = %id, "Subscriber worker started");

    loop {
        let message = tokio::select! {
            biased;
            // Err means the bus dropped the worker without stopping it.
            _ = stop_rx.wait_for(|stopped| *stopped) => break,
            received = receiver.recv() => match received {
                Some(message) => message,
                None => break,
            },
        };

        if *stop_rx.borrow() {
            break;
        }

        let outcome = AssertUnwindSafe(handler.handle_shared(message))
            .catch_unwind()
            .await;

        match outcome {
            Ok(()) => counters.record_delivered(),
            Err(panic) => {
                counters.record_callback_panic();
                error!(
                    subject = %subject,
                    subscription = %id,
                    panic = panic_message(panic.as_ref()),
                    "Subscriber callback panicked; message skipped"
                );
            }
        }
    }

    debug!(subject = %subject, subscription = %id, "Subscriber worker exited");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// Removal target of a [`Subscription`].
pub(crate) trait Deregister: Send + Sync {
    fn deregister(&self, subject: &str, id: SubscriptionId);
}

/// Handle to one active subscription.
///
/// Dropping the handle unsubscribes. Call [`Subscription::detach`] to keep
/// the subscription registered until the bus closes.
#[must_use = "dropping a Subscription unsubscribes it immediately"]
pub struct Subscription {
    id: SubscriptionId,
    subject: String,
    bus: Weak<dyn Deregister>,
    active: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, subject: String, bus: Weak<dyn Deregister>) -> Self {
        Self {
            id,
            subject,
            bus,
            active: AtomicBool::new(true),
        }
    }

    /// Identifier of this subscription.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Subject this subscription listens on.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Remove the subscription from the bus and stop its worker.
    ///
    /// Safe to call repeatedly, concurrently with delivery, from inside the
    /// subscription's own callback, and after the bus has closed or been
    /// dropped. A callback already running finishes; no publish that starts
    /// after this returns reaches the subscriber.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            bus.deregister(&self.subject, self.id);
        }
    }

    /// Give up the handle without unsubscribing.
    ///
    /// The subscription then lives until the bus closes.
    pub fn detach(self) {
        self.active.store(false, Ordering::Release);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("subject", &self.subject)
            .field("active", &self.active.load(Ordering::Relaxed))
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
