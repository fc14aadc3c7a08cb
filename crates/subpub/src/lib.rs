//! # SubPub - In-Process Publish/Subscribe Bus
//!
//! Producers publish a value under a subject; every subscriber currently
//! registered for that subject receives it asynchronously, independent of the
//! publisher and of other subscribers.
//!
//! ## Architecture
//!
//! ```text
//!                      ┌───────────────────────────────────────────────┐
//!  publish(subject) ──►│ Dispatcher ──snapshot──► Subject Registry     │
//!                      │     │                    (RwLock<HashMap>)    │
//!                      │     ├─offer──► [queue] ─► worker ─► callback  │
//!                      │     └─offer──► [queue] ─► worker ─► callback  │
//!                      │                                               │
//!  close(timeout) ────►│ Lifecycle: Open ─► Closing ─► Closed          │
//!                      └───────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Per-subscriber FIFO:** one worker task per subscription handles its
//!   messages one at a time, in publish order.
//! - **Isolation:** a slow or panicking callback affects only its own
//!   subscription.
//! - **Non-blocking publish:** a full queue is resolved by the
//!   [`OverflowPolicy`], never by waiting.
//! - **Finality:** after `unsubscribe` or `close`, no new callback starts.
//! - **Bounded shutdown:** `close` never waits past its timeout.
//!
//! ## Not guaranteed
//!
//! - Ordering across subscribers or subjects.
//! - Delivery to a subscription created while a publish is in flight.
//! - Ordering of a message handed off under [`OverflowPolicy::Handoff`]
//!   relative to concurrent publishes.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

mod bus;
pub mod config;
pub mod errors;
pub mod handler;
mod lifecycle;
mod publisher;
mod registry;
mod stats;
mod stream;
mod subscriber;

pub use bus::InMemoryBus;
pub use config::{BusConfig, OverflowPolicy, ParsePolicyError};
pub use errors::BusError;
pub use handler::{FnHandler, MessageHandler};
pub use lifecycle::BusState;
pub use stats::BusStats;
pub use stream::MessageStream;
pub use subscriber::{Subscription, SubscriptionId};

/// Pending messages buffered per subscriber by default.
pub const DEFAULT_QUEUE_CAPACITY: usize = 128;
