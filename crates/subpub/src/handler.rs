//! # Message Handlers
//!
//! The callback side of a subscription. Synchronous closures are wrapped in
//! [`FnHandler`] and run on the blocking thread pool; anything that needs to
//! await (a slow consumer, a forwarder into another channel) implements
//! [`MessageHandler`] directly.

use std::panic;
use std::sync::Arc;

use async_trait::async_trait;

/// Callback invoked by a subscriber worker once per delivered message.
///
/// Invocations for one subscription never overlap and follow publish order.
/// Implementations should not block the thread; await instead. A panic is
/// caught by the worker and logged, and the next message is still delivered.
#[async_trait]
pub trait MessageHandler<M>: Send + Sync + 'static
where
    M: Send + Sync + 'static,
{
    /// Handle one message.
    async fn handle(&self, message: &M);

    /// Handle one message the worker shares with other subscribers.
    ///
    /// This is what the subscriber worker calls. Handlers that must move the
    /// message to another task or thread override it; the default borrows
    /// and calls [`MessageHandler::handle`].
    async fn handle_shared(&self, message: Arc<M>) {
        self.handle(&message).await;
    }
}

/// Adapter running a synchronous closure as a [`MessageHandler`].
///
/// Each delivery runs on Tokio's blocking pool, so a callback that sleeps or
/// does blocking I/O never holds an async worker thread. Other subscribers
/// and the close deadline keep making progress meanwhile. A panic inside the
/// closure is re-raised on the subscriber worker, where it is contained.
pub struct FnHandler<F> {
    callback: Arc<F>,
}

impl<F> FnHandler<F> {
    /// Wrap a closure.
    pub fn new(callback: F) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }
}

#[async_trait]
impl<M, F> MessageHandler<M> for FnHandler<F>
where
    M: Send + Sync + 'static,
    F: Fn(&M) + Send + Sync + 'static,
{
    async fn handle(&self, message: &M) {
        (self.callback)(message);
    }

    async fn handle_shared(&self, message: Arc<M>) {
        let callback = Arc::clone(&self.callback);
        match tokio::task::spawn_blocking(move || (*callback)(&*message)).await {
            Ok(()) => {}
            Err(err) if err.is_panic() => panic::resume_unwind(err.into_panic()),
            // Cancelled: the runtime is shutting down.
            Err(_) => {}
        }
    }
}
