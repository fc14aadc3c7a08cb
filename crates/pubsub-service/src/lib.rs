//! # Pub/Sub Service
//!
//! Application layer over the [`subpub`] bus: clients subscribe to a string
//! key and receive every string event published on it afterwards.
//!
//! ## Architecture
//!
//! ```text
//! transport ──► PubSubApi (inbound port) ──► PubSubService ──► InMemoryBus<String>
//!                                               │
//!                                  EventStream ◄┘ (one per subscribe call)
//! ```
//!
//! ## Error Mapping
//!
//! | Error | Status |
//! |-------|--------|
//! | `InvalidArgument` | `INVALID_ARGUMENT` |
//! | `BusClosed` | `UNAVAILABLE` |
//! | `PublishFailed` | `INTERNAL` |
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GRPC_PORT` | `50051` | Transport port |
//! | `PUBSUB_SHUTDOWN_TIMEOUT_MS` | `5000` | Shutdown deadline |
//! | `PUBSUB_QUEUE_CAPACITY` | `128` | Per-subscriber queue capacity |
//! | `PUBSUB_OVERFLOW_POLICY` | `handoff` | `handoff` or `drop-newest` |
//! | `PUBSUB_LOG_LEVEL` | `info` | Log filter (falls back to `RUST_LOG`) |
//! | `PUBSUB_JSON_LOGS` | `false` | JSON formatted logs |

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod errors;
pub mod ports;
pub mod service;
pub mod telemetry;

pub use config::{LogConfig, ServiceConfig};
pub use errors::{ConfigError, ServiceError, StatusCode, TelemetryError};
pub use ports::PubSubApi;
pub use service::{Event, EventStream, PubSubService};
pub use telemetry::init_tracing;
