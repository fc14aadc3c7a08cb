//! # Ports
//!
//! Inbound API a transport drives to reach the service.

pub mod inbound;

pub use inbound::PubSubApi;
