//! # Inbound Port - PubSubApi
//!
//! Primary driving port a transport (gRPC, HTTP, in-process callers) uses to
//! subscribe to keys and publish string events.

use async_trait::async_trait;

use crate::errors::ServiceError;
use crate::service::EventStream;

/// Keyed publish/subscribe API.
///
/// # Example
///
/// ```rust,ignore
/// use pubsub_service::PubSubApi;
/// use tokio_stream::StreamExt;
///
/// async fn example(api: &impl PubSubApi) {
///     let mut events = api.subscribe("orders").await?;
///     api.publish("orders", "A".to_string()).await?;
///     let event = events.next().await;
/// }
/// ```
#[async_trait]
pub trait PubSubApi: Send + Sync {
    /// Opens a stream of events published on `key` from now on.
    ///
    /// The subscription lasts until the stream is dropped or the service
    /// shuts down, at which point the stream ends.
    ///
    /// # Errors
    /// - `InvalidArgument`: `key` is empty
    /// - `BusClosed`: the service is shutting down
    async fn subscribe(&self, key: &str) -> Result<EventStream, ServiceError>;

    /// Publishes `data` to every current subscriber of `key`.
    ///
    /// Returns once the event is handed to the subscribers, without waiting
    /// for them to process it.
    ///
    /// # Errors
    /// - `InvalidArgument`: `key` or `data` is empty
    /// - `PublishFailed`: the bus rejected the event
    async fn publish(&self, key: &str, data: String) -> Result<(), ServiceError>;
}
