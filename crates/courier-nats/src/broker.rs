//! The broker contract the bridge is written against.
//!
//! A broker moves opaque byte payloads between named channels. Two channel
//! kinds exist:
//!
//! - **work queues**: durable and shared, consumed with explicit ack/nack;
//! - **reply channels**: temporary and exclusive to one waiting caller, named
//!   with [`reply_channel_name`](crate::channel::reply_channel_name).
//!
//! [`publish`](Broker::publish) picks the kind from the channel name.

use bytes::Bytes;
use futures::stream::BoxStream;
use opentelemetry::Context;
use std::fmt;
use std::future::Future;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    Declaration { channel: String, reason: String },
    Publish { channel: String, reason: String },
    Delete { channel: String, reason: String },
    Consume { channel: String, reason: String },
    Ack { reason: String },
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declaration { channel, reason } => {
                write!(f, "failed to declare channel '{channel}': {reason}")
            }
            Self::Publish { channel, reason } => {
                write!(f, "failed to publish to '{channel}': {reason}")
            }
            Self::Delete { channel, reason } => {
                write!(f, "failed to delete channel '{channel}': {reason}")
            }
            Self::Consume { channel, reason } => {
                write!(f, "failed to consume from '{channel}': {reason}")
            }
            Self::Ack { reason } => write!(f, "failed to settle delivery: {reason}"),
        }
    }
}

impl std::error::Error for BrokerError {}

/// Deliveries pulled from a work queue. A stream error is transient: the
/// consumer logs it and keeps polling.
pub type Deliveries<D> = BoxStream<'static, Result<D, BrokerError>>;

/// One message taken from a work queue, awaiting settlement.
pub trait Delivery: Send + Sync + 'static {
    fn payload(&self) -> &[u8];

    /// Trace context the publisher attached, empty when there is none.
    fn trace_context(&self) -> Context;

    /// Tell the broker the message is being worked on, restarting its
    /// redelivery timer.
    fn in_progress(&self) -> impl Future<Output = Result<(), BrokerError>> + Send;

    fn ack(&self) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Reject the message. Without `requeue` it is never redelivered.
    fn nack(&self, requeue: bool) -> impl Future<Output = Result<(), BrokerError>> + Send;
}

pub trait Broker: Send + Sync + Clone + 'static {
    type Delivery: Delivery;

    /// Send `payload` to `channel`. Work queues are declared on first use;
    /// a reply channel that no longer exists silently drops the message.
    fn publish(
        &self,
        channel: &str,
        payload: Bytes,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Idempotent.
    fn declare_work_queue(&self, queue: &str)
    -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Create an exclusive reply channel. Declaring a name that is already
    /// live fails.
    fn declare_temporary(&self, name: &str)
    -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Remove a channel. Deleting an absent channel succeeds.
    fn delete(&self, name: &str) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Next message on a reply channel, or `None` once the channel is gone.
    fn next_reply(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<Bytes>, BrokerError>> + Send;

    /// Attach a named consumer to a work queue, declaring the queue if needed.
    fn consume(
        &self,
        queue: &str,
        consumer: &str,
    ) -> impl Future<Output = Result<Deliveries<Self::Delivery>, BrokerError>> + Send;

    fn is_connected(&self) -> bool;

    /// Release reply channels, then the connection. Best effort.
    fn close(&self) -> impl Future<Output = ()> + Send;
}
