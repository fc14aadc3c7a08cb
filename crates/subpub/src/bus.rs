//! # In-Memory Bus
//!
//! The explicitly constructed bus instance. Cloning an [`InMemoryBus`] is
//! cheap and every clone refers to the same registry and lifecycle.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::debug;

use crate::config::BusConfig;
use crate::errors::BusError;
use crate::handler::{FnHandler, MessageHandler};
use crate::lifecycle::{self, BusState, Lifecycle};
use crate::publisher;
use crate::registry::SubjectRegistry;
use crate::stats::{BusCounters, BusStats};
use crate::subscriber::{Deregister, SubscriberWorker, Subscription, SubscriptionId};

/// Shared state behind every clone of an [`InMemoryBus`].
pub(crate) struct BusInner<M> {
    config: BusConfig,
    runtime: Handle,
    registry: SubjectRegistry<SubscriberWorker<M>>,
    lifecycle: Lifecycle,
    counters: Arc<BusCounters>,
}

impl<M> BusInner<M> {
    pub(crate) fn config(&self) -> &BusConfig {
        &self.config
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub(crate) fn registry(&self) -> &SubjectRegistry<SubscriberWorker<M>> {
        &self.registry
    }

    pub(crate) fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub(crate) fn counters(&self) -> &BusCounters {
        &self.counters
    }
}

impl<M> Deregister for BusInner<M>
where
    M: Send + Sync + 'static,
{
    fn deregister(&self, subject: &str, id: SubscriptionId) {
        // Removal first: no publish starting after this can see the worker.
        if let Some(worker) = self.registry.deregister(subject, id) {
            worker.stop();
            debug!(subject = %subject, subscription = %id, "Unsubscribed");
        }
    }
}

/// In-process publish/subscribe bus carrying messages of type `M`.
///
/// Every subscriber gets its own bounded queue and worker task, so a slow
/// subscriber never delays the publisher or other subscribers. Messages for
/// one subscriber are handled in publish order.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use subpub::InMemoryBus;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), subpub::BusError> {
/// let bus = InMemoryBus::<String>::new();
/// let subscription = bus.subscribe("orders", |order: &String| {
///     println!("received {order}");
/// })?;
///
/// bus.publish("orders", "A-1".to_string())?;
///
/// subscription.unsubscribe();
/// bus.close(Duration::from_secs(1)).await?;
/// # Ok(())
/// # }
/// ```
pub struct InMemoryBus<M> {
    inner: Arc<BusInner<M>>,
}

impl<M> Clone for InMemoryBus<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M> InMemoryBus<M>
where
    M: Send + Sync + 'static,
{
    /// Create a bus with default configuration on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, like `tokio::spawn`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a bus with `config` on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, like `tokio::spawn`.
    #[must_use]
    pub fn with_config(config: BusConfig) -> Self {
        Self::with_runtime(config, Handle::current())
    }

    /// Create a bus whose worker tasks are spawned on `runtime`.
    #[must_use]
    pub fn with_runtime(config: BusConfig, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config,
                runtime,
                registry: SubjectRegistry::new(),
                lifecycle: Lifecycle::new(),
                counters: Arc::new(BusCounters::default()),
            }),
        }
    }

    /// Subscribe a synchronous callback to `subject`.
    ///
    /// Each invocation runs on Tokio's blocking pool, one at a time and in
    /// publish order, so a callback may block without stalling other
    /// subscribers or `close`. Consumers that can await should prefer
    /// [`InMemoryBus::subscribe_handler`].
    ///
    /// # Errors
    ///
    /// [`BusError::Closed`] once the bus has started closing.
    pub fn subscribe<F>(
        &self,
        subject: impl Into<String>,
        callback: F,
    ) -> Result<Subscription, BusError>
    where
        F: Fn(&M) + Send + Sync + 'static,
    {
        self.subscribe_handler(subject, FnHandler::new(callback))
    }

    /// Subscribe an asynchronous [`MessageHandler`] to `subject`.
    ///
    /// # Errors
    ///
    /// [`BusError::Closed`] once the bus has started closing.
    pub fn subscribe_handler<H>(
        &self,
        subject: impl Into<String>,
        handler: H,
    ) -> Result<Subscription, BusError>
    where
        H: MessageHandler<M>,
    {
        self.register(subject.into(), Arc::new(handler))
    }

    fn register(
        &self,
        subject: String,
        handler: Arc<dyn MessageHandler<M>>,
    ) -> Result<Subscription, BusError> {
        let inner = &self.inner;
        if !inner.lifecycle.is_open() {
            return Err(BusError::Closed);
        }

        let id = SubscriptionId::new();
        inner.registry.register_with(&subject, id, || {
            // Re-checked under the write lock so close cannot miss this worker.
            if !inner.lifecycle.is_open() {
                return Err(BusError::Closed);
            }
            Ok(SubscriberWorker::spawn(
                id,
                subject.clone(),
                handler,
                inner.config.effective_capacity(),
                &inner.runtime,
                inner.lifecycle.workers(),
                Arc::clone(&inner.counters),
            ))
        })?;

        debug!(subject = %subject, subscription = %id, "Subscribed");

        let bus: Weak<dyn Deregister> = Arc::downgrade(inner) as Weak<dyn Deregister>;
        Ok(Subscription::new(id, subject, bus))
    }

    /// Publish `message` to every current subscriber of `subject`.
    ///
    /// Returns the number of subscribers the message was offered to; zero is
    /// not an error. Never waits for subscribers. A subscription created
    /// concurrently with this call may or may not receive the message.
    ///
    /// # Errors
    ///
    /// [`BusError::Closed`] once the bus has started closing.
    pub fn publish(&self, subject: &str, message: M) -> Result<usize, BusError> {
        publisher::dispatch(&*self.inner, subject, message)
    }

    /// Close the bus, waiting at most `timeout` for subscriber workers.
    ///
    /// Subscribes and publishes fail from the moment this is first called.
    /// Calls after the first return `Ok(())` immediately. Safe to call from
    /// any task; a callback that closes its own bus waits out `timeout`,
    /// since its worker cannot exit before the callback returns.
    ///
    /// # Errors
    ///
    /// [`BusError::ShutdownDeadlineExceeded`] when workers were still running
    /// at the deadline. The bus is closed either way.
    pub async fn close(&self, timeout: Duration) -> Result<(), BusError> {
        lifecycle::close(&*self.inner, timeout).await
    }

    /// True while `subscription` is registered on this bus.
    #[must_use]
    pub fn is_registered(&self, subscription: &Subscription) -> bool {
        self.inner
            .registry
            .contains(subscription.subject(), subscription.id())
    }
}

impl<M> InMemoryBus<M> {
    /// Configuration the bus was built with.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> BusState {
        self.inner.lifecycle.state()
    }

    /// True once `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        !self.inner.lifecycle.is_open()
    }

    /// Subjects with at least one subscriber.
    #[must_use]
    pub fn subject_count(&self) -> usize {
        self.inner.registry.subject_count()
    }

    /// Subscribers currently registered on `subject`.
    #[must_use]
    pub fn subscriber_count(&self, subject: &str) -> usize {
        self.inner.registry.subscriber_count(subject)
    }

    /// Worker tasks that have not exited yet, including those of removed
    /// subscriptions still finishing a callback.
    #[must_use]
    pub fn live_workers(&self) -> usize {
        self.inner.lifecycle.workers().live()
    }

    /// Snapshot of delivery counters.
    #[must_use]
    pub fn stats(&self) -> BusStats {
        self.inner.counters.snapshot()
    }
}

impl<M> Default for InMemoryBus<M>
where
    M: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for InMemoryBus<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryBus")
            .field("state", &self.state())
            .field("subjects", &self.subject_count())
            .field("config", &self.inner.config)
            .finish()
    }
}
