//! # Message Streams
//!
//! A subscription consumed as a [`Stream`] instead of a callback. The
//! subscription lives exactly as long as the stream: dropping it
//! unsubscribes, and the stream ends once the bus closes.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;

use crate::bus::InMemoryBus;
use crate::errors::BusError;
use crate::handler::MessageHandler;
use crate::subscriber::{Subscription, SubscriptionId};

/// Forwards each delivered message into the stream's channel.
///
/// Waiting on a full channel pushes back onto the subscriber queue, where
/// the bus's overflow policy takes over.
struct Forwarder<M> {
    sender: mpsc::Sender<M>,
}

#[async_trait]
impl<M> MessageHandler<M> for Forwarder<M>
where
    M: Clone + Send + Sync + 'static,
{
    async fn handle(&self, message: &M) {
        // Err only when the stream is gone; its subscription is going too.
        let _ = self.sender.send(message.clone()).await;
    }
}

/// Stream of messages published on one subject.
pub struct MessageStream<M> {
    subscription: Subscription,
    receiver: ReceiverStream<M>,
}

impl<M> MessageStream<M> {
    /// Identifier of the underlying subscription.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.subscription.id()
    }

    /// Subject this stream listens on.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.subscription.subject()
    }

    /// Stop receiving new messages.
    ///
    /// Messages already buffered are still yielded, then the stream ends.
    pub fn unsubscribe(&self) {
        self.subscription.unsubscribe();
    }
}

impl<M> Stream for MessageStream<M> {
    type Item = M;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}

impl<M> InMemoryBus<M>
where
    M: Clone + Send + Sync + 'static,
{
    /// Subscribe to `subject` and receive messages as a [`Stream`].
    ///
    /// Each message is cloned once into the stream. The stream buffers up to
    /// the configured queue capacity on top of the subscriber queue.
    ///
    /// # Errors
    ///
    /// [`BusError::Closed`] once the bus has started closing.
    pub fn subscribe_stream(
        &self,
        subject: impl Into<String>,
    ) -> Result<MessageStream<M>, BusError> {
        let (sender, receiver) = mpsc::channel(self.config().effective_capacity());
        let subscription = self.subscribe_handler(subject, Forwarder { sender })?;
        Ok(MessageStream {
            subscription,
            receiver: ReceiverStream::new(receiver),
        })
    }
}
