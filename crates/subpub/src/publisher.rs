//! # Delivery Dispatcher
//!
//! Fan-out of one published message to every subscriber of its subject.
//!
//! The message is wrapped in a single `Arc` and each subscriber's queue is
//! offered a clone of that pointer. The publisher never waits for a
//! subscriber: a full queue is resolved by the configured
//! [`OverflowPolicy`].

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::bus::BusInner;
use crate::config::OverflowPolicy;
use crate::errors::BusError;
use crate::subscriber::{Offer, SubscriberWorker};

/// Publish `message` on `subject`.
///
/// Returns the number of subscribers the message was offered to.
pub(crate) fn dispatch<M>(
    bus: &BusInner<M>,
    subject: &str,
    message: M,
) -> Result<usize, BusError>
where
    M: Send + Sync + 'static,
{
    if !bus.lifecycle().is_open() {
        return Err(BusError::Closed);
    }
    bus.counters().record_published();

    // Snapshot under the read lock; offering happens after it is released.
    let subscribers = bus.registry().snapshot(subject);
    if subscribers.is_empty() {
        trace!(subject = %subject, "Published to subject without subscribers");
        return Ok(0);
    }

    let message = Arc::new(message);
    for subscriber in &subscribers {
        match subscriber.offer(Arc::clone(&message)) {
            Offer::Accepted => bus.counters().record_enqueued(),
            Offer::Full(message) => overflow(bus, subscriber, message),
            Offer::Closed => {
                trace!(
                    subject = %subject,
                    subscription = %subscriber.id(),
                    "Subscriber stopped during publish; skipped"
                );
            }
        }
    }

    debug!(subject = %subject, receivers = subscribers.len(), "Message published");
    Ok(subscribers.len())
}

fn overflow<M>(bus: &BusInner<M>, subscriber: &Arc<SubscriberWorker<M>>, message: Arc<M>)
where
    M: Send + Sync + 'static,
{
    match bus.config().overflow_policy {
        OverflowPolicy::Handoff => hand_off(bus, subscriber, message),
        OverflowPolicy::DropNewest => {
            bus.counters().record_dropped();
            warn!(
                subject = %subscriber.subject(),
                subscription = %subscriber.id(),
                "Subscriber queue full; message dropped"
            );
        }
    }
}

/// Wait for queue space on a background task instead of the publisher.
fn hand_off<M>(bus: &BusInner<M>, subscriber: &Arc<SubscriberWorker<M>>, message: Arc<M>)
where
    M: Send + Sync + 'static,
{
    bus.counters().record_handed_off();

    let in_flight = Arc::clone(subscriber.handoffs());
    let pending = in_flight.fetch_add(1, Ordering::AcqRel) + 1;
    let threshold = bus.config().handoff_warn_threshold.max(1);
    if pending % threshold == 0 {
        warn!(
            subject = %subscriber.subject(),
            subscription = %subscriber.id(),
            pending,
            "Slow subscriber: handoffs accumulating"
        );
    } else {
        trace!(
            subject = %subscriber.subject(),
            subscription = %subscriber.id(),
            pending,
            "Subscriber queue full; message handed off"
        );
    }

    let sender = subscriber.sender();
    bus.runtime().spawn(async move {
        // Fails only once the worker has exited; the message is moot then.
        let _ = sender.send(message).await;
        in_flight.fetch_sub(1, Ordering::AcqRel);
    });
}

#[cfg(test)]
mod tests {
    use crate::{BusConfig, BusError, InMemoryBus, OverflowPolicy};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Semaphore;
    use tokio::time::timeout;

    /// Handler that blocks on a semaphore until the test releases it.
    struct Gate {
        permits: Arc<Semaphore>,
        seen: Arc<Mutex<Vec<u32>>>,
    }

    #[async_trait::async_trait]
    impl crate::MessageHandler<u32> for Gate {
        async fn handle(&self, message: &u32) {
            if let Ok(permit) = self.permits.acquire().await {
                permit.forget();
            }
            self.seen.lock().push(*message);
        }
    }

    async fn wait_for_len(seen: &Arc<Mutex<Vec<u32>>>, len: usize) {
        timeout(Duration::from_secs(2), async {
            while seen.lock().len() < len {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("messages delivered in time");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = InMemoryBus::<u32>::new();

        assert_eq!(bus.publish("nobody", 1), Ok(0));
        assert_eq!(bus.stats().published, 1);
        assert_eq!(bus.stats().enqueued, 0);
    }

    #[tokio::test]
    async fn test_publish_counts_receivers() {
        let bus = InMemoryBus::<u32>::new();
        let _a = bus.subscribe("t", |_: &u32| {}).expect("subscribe");
        let _b = bus.subscribe("t", |_: &u32| {}).expect("subscribe");
        let _other = bus.subscribe("u", |_: &u32| {}).expect("subscribe");

        assert_eq!(bus.publish("t", 7), Ok(2));
        assert_eq!(bus.stats().enqueued, 2);
    }

    #[tokio::test]
    async fn test_publish_after_close_fails() {
        let bus = InMemoryBus::<u32>::new();
        bus.close(Duration::from_millis(10)).await.expect("close");

        assert_eq!(bus.publish("t", 1), Err(BusError::Closed));
        assert_eq!(bus.stats().published, 0);
    }

    #[tokio::test]
    async fn test_handoff_delivers_overflow() {
        let config = BusConfig::default()
            .with_queue_capacity(1)
            .with_overflow_policy(OverflowPolicy::Handoff);
        let bus = InMemoryBus::with_config(config);
        let permits = Arc::new(Semaphore::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _sub = bus
            .subscribe_handler(
                "slow",
                Gate {
                    permits: Arc::clone(&permits),
                    seen: Arc::clone(&seen),
                },
            )
            .expect("subscribe");

        for n in 0..5 {
            assert_eq!(bus.publish("slow", n), Ok(1));
        }
        let stats = bus.stats();
        assert_eq!(stats.published, 5);
        assert!(stats.handed_off >= 3, "expected overflow handoffs: {stats:?}");
        assert_eq!(stats.dropped, 0);

        permits.add_permits(5);
        wait_for_len(&seen, 5).await;

        let mut delivered = seen.lock().clone();
        delivered.sort_unstable();
        assert_eq!(delivered, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_drop_newest_discards_overflow() {
        let config = BusConfig::default()
            .with_queue_capacity(2)
            .with_overflow_policy(OverflowPolicy::DropNewest);
        let bus = InMemoryBus::with_config(config);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _sub = bus
            .subscribe("burst", move |_: &u32| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .expect("subscribe");

        // Current-thread runtime: the worker cannot drain between publishes.
        for n in 0..5 {
            assert_eq!(bus.publish("burst", n), Ok(1));
        }

        let stats = bus.stats();
        assert_eq!(stats.enqueued, 2);
        assert_eq!(stats.dropped, 3);
        assert_eq!(stats.handed_off, 0);

        timeout(Duration::from_secs(1), async {
            while calls.load(Ordering::SeqCst) < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("queued messages delivered");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fast_subscriber_unaffected_by_full_queue() {
        let config = BusConfig::default().with_queue_capacity(1);
        let bus = InMemoryBus::with_config(config);
        let permits = Arc::new(Semaphore::new(0));
        let slow_seen = Arc::new(Mutex::new(Vec::new()));
        let fast_seen = Arc::new(Mutex::new(Vec::new()));
        let _slow = bus
            .subscribe_handler(
                "mixed",
                Gate {
                    permits: Arc::clone(&permits),
                    seen: Arc::clone(&slow_seen),
                },
            )
            .expect("subscribe");
        let sink = Arc::clone(&fast_seen);
        let _fast = bus
            .subscribe("mixed", move |n: &u32| sink.lock().push(*n))
            .expect("subscribe");

        for n in 0..3 {
            assert_eq!(bus.publish("mixed", n), Ok(2));
            // Let the fast worker drain its single-slot queue.
            wait_for_len(&fast_seen, n as usize + 1).await;
        }

        assert_eq!(*fast_seen.lock(), vec![0, 1, 2]);
        assert!(slow_seen.lock().is_empty());

        permits.add_permits(3);
        wait_for_len(&slow_seen, 3).await;
    }
}
