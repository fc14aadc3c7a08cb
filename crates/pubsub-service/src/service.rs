//! # Pub/Sub Service
//!
//! Adapts the generic bus to string events addressed by key.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use subpub::{BusError, InMemoryBus, MessageStream};
use tokio_stream::Stream;
use tracing::{debug, error, info, warn};

use crate::config::ServiceConfig;
use crate::errors::ServiceError;
use crate::ports::PubSubApi;

/// One event delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub data: String,
}

/// Events published on one key, in publish order.
///
/// Dropping the stream ends the subscription.
pub struct EventStream {
    key: String,
    inner: MessageStream<String>,
}

impl EventStream {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner)
            .poll_next(cx)
            .map(|next| next.map(|data| Event { data }))
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("key", &self.key)
            .field("subscription", &self.inner.id())
            .finish()
    }
}

/// Keyed string pub/sub on top of an [`InMemoryBus`].
pub struct PubSubService {
    bus: Arc<InMemoryBus<String>>,
    shutdown_timeout: Duration,
}

impl PubSubService {
    pub fn new(bus: Arc<InMemoryBus<String>>, shutdown_timeout: Duration) -> Self {
        Self {
            bus,
            shutdown_timeout,
        }
    }

    /// Build the service and its bus from configuration.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn from_config(config: &ServiceConfig) -> Self {
        let bus = InMemoryBus::with_config(config.bus_config());
        Self::new(Arc::new(bus), config.shutdown_timeout)
    }

    pub fn bus(&self) -> &Arc<InMemoryBus<String>> {
        &self.bus
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Close the bus, waiting up to the configured shutdown timeout for
    /// in-flight callbacks.
    ///
    /// # Errors
    ///
    /// [`BusError::ShutdownDeadlineExceeded`] when callbacks were still
    /// running at the deadline. The bus is closed either way.
    pub async fn shutdown(&self) -> Result<(), BusError> {
        info!(timeout = ?self.shutdown_timeout, "Shutting down pub/sub service");
        let result = self.bus.close(self.shutdown_timeout).await;
        match &result {
            Ok(()) => info!("Pub/sub service stopped"),
            Err(err) => warn!(error = %err, "Pub/sub service shutdown overran its deadline"),
        }
        result
    }
}

#[async_trait]
impl PubSubApi for PubSubService {
    async fn subscribe(&self, key: &str) -> Result<EventStream, ServiceError> {
        if key.is_empty() {
            return Err(ServiceError::InvalidArgument("key is required".to_string()));
        }

        let inner = self.bus.subscribe_stream(key).map_err(|err| {
            debug!(key = %key, error = %err, "Subscribe rejected");
            ServiceError::BusClosed
        })?;
        debug!(key = %key, subscription = %inner.id(), "Client subscribed");

        Ok(EventStream {
            key: key.to_string(),
            inner,
        })
    }

    async fn publish(&self, key: &str, data: String) -> Result<(), ServiceError> {
        if key.is_empty() || data.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "key and data required".to_string(),
            ));
        }

        match self.bus.publish(key, data) {
            Ok(receivers) => {
                debug!(key = %key, receivers, "Event published");
                Ok(())
            }
            Err(err) => {
                error!(key = %key, error = %err, "Publish failed");
                Err(ServiceError::PublishFailed(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StatusCode;
    use tokio::time::timeout;
    use tokio_stream::StreamExt;

    fn service() -> PubSubService {
        PubSubService::new(Arc::new(InMemoryBus::new()), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_subscribe_requires_key() {
        let err = service().subscribe("").await.unwrap_err();
        assert_eq!(err, ServiceError::InvalidArgument("key is required".into()));
        assert_eq!(err.status(), StatusCode::InvalidArgument);
    }

    #[tokio::test]
    async fn test_publish_requires_key_and_data() {
        let service = service();
        for (key, data) in [("", "x"), ("k", ""), ("", "")] {
            let err = service.publish(key, data.to_string()).await.unwrap_err();
            assert_eq!(
                err,
                ServiceError::InvalidArgument("key and data required".into())
            );
        }
        assert_eq!(service.bus().stats().published, 0);
    }

    #[tokio::test]
    async fn test_stream_receives_events() {
        let service = service();
        let mut events = service.subscribe("orders").await.unwrap();
        assert_eq!(events.key(), "orders");

        service.publish("orders", "A".to_string()).await.unwrap();

        let event = timeout(Duration::from_secs(1), events.next())
            .await
            .expect("timely delivery");
        assert_eq!(
            event,
            Some(Event {
                data: "A".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_dropping_stream_unsubscribes() {
        let service = service();
        let events = service.subscribe("k").await.unwrap();
        assert_eq!(service.bus().subscriber_count("k"), 1);

        drop(events);
        assert_eq!(service.bus().subscriber_count("k"), 0);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_further_calls() {
        let service = service();
        let mut events = service.subscribe("k").await.unwrap();

        service.shutdown().await.unwrap();

        let end = timeout(Duration::from_secs(1), events.next())
            .await
            .expect("stream ends");
        assert_eq!(end, None);

        let err = service.subscribe("k").await.unwrap_err();
        assert_eq!(err, ServiceError::BusClosed);
        assert_eq!(err.status(), StatusCode::Unavailable);

        let err = service.publish("k", "late".to_string()).await.unwrap_err();
        assert_eq!(err, ServiceError::PublishFailed(BusError::Closed));
        assert_eq!(err.status(), StatusCode::Internal);
    }

    #[tokio::test]
    async fn test_from_config() {
        let config = ServiceConfig {
            queue_capacity: 4,
            shutdown_timeout: Duration::from_millis(50),
            ..ServiceConfig::default()
        };
        let service = PubSubService::from_config(&config);

        assert_eq!(service.bus().config().queue_capacity, 4);
        assert_eq!(service.shutdown_timeout(), Duration::from_millis(50));
    }
}
