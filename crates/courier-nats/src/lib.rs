//! # courier-nats
//!
//! Broker plumbing for the courier request/response bridge.
//!
//! This crate provides:
//! - NATS configuration resolved from the environment
//! - Connection management with reconnect backoff and event logging
//! - The [`Broker`] contract: durable work queues, temporary reply channels,
//!   publish, consume with ack/nack, and shutdown
//! - [`NatsBroker`], the JetStream + Core NATS implementation
//! - Trace-context propagation through NATS headers
//! - [`MemoryBroker`], an in-process broker for tests (with `test-support`)
//!
//! ## Channel model
//!
//! | Channel | NATS mapping |
//! |---------|--------------|
//! | Work queue `q` | JetStream stream `COURIER_WORK_Q`, subject `{prefix}.work.q`, work-queue retention, file storage |
//! | Reply channel `response-{id}` | Core NATS subscription on `{prefix}.reply.response-{id}` |
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use courier_nats::{Broker, NatsBroker, NatsConfig, connect};
//! use courier_std::SystemEnv;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = NatsConfig::from_env(&SystemEnv);
//!     let client = connect(&config, Duration::from_secs(10)).await.expect("connect");
//!     let broker = NatsBroker::new(client, "courier");
//!     broker.publish("copilot-api", "{}".into()).await.expect("publish");
//! }
//! ```

pub mod auth;
pub mod broker;
pub mod channel;
pub mod connect;
pub mod nats_broker;
pub mod trace;

#[cfg(any(test, feature = "test-support"))]
pub mod mocks;

pub use auth::{NatsAuth, NatsConfig};
pub use broker::{Broker, BrokerError, Deliveries, Delivery};
pub use channel::{REPLY_CHANNEL_PREFIX, Subjects, is_reply_channel, reply_channel_name};
pub use connect::{ConnectError, connect};
pub use nats_broker::{DEFAULT_ACK_WAIT, NatsBroker, NatsDelivery};
pub use trace::{extract_trace_context, headers_with_trace_context, inject_trace_context};

#[cfg(any(test, feature = "test-support"))]
pub use mocks::{MemoryBroker, MemoryDelivery, Settlement};
