//! # courier-bridge
//!
//! Synchronous HTTP semantics over an asynchronous, at-least-once broker.
//!
//! ```text
//! HTTP caller ──► gateway ──► Bridge::call
//!                               │ declare  response-{id}
//!                               │ publish  RequestEnvelope ──► work queue ──► ConsumerLoop
//!                               │                                               │ Processor
//!                               │ wait     ResponseEnvelope ◄── response-{id} ◄─┘ publish, then ack
//!                               └ delete   response-{id}
//! ```
//!
//! Every call owns exactly one reply channel, and that channel is deleted on
//! every exit path, including cancellation of the calling future.

pub mod bridge;
pub mod config;
pub mod consumer;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod processor;
pub mod publisher;
pub mod reply_channel;
pub mod waiter;

pub use bridge::Bridge;
pub use config::{BridgeConfig, MAX_TIMEOUT};
pub use consumer::{ConsumerLoop, ConsumerState, RunningPool, WorkerPool};
pub use envelope::{RequestEnvelope, ResponseEnvelope, flatten_headers};
pub use error::BridgeError;
pub use gateway::{GatewayState, router};
pub use processor::{
    DuplicateProcessor, ProcessContext, Processor, ProcessorError, ProcessorRegistry,
    ProcessorResponse,
};
pub use publisher::{OutboundRequest, RequestPublisher};
pub use reply_channel::ReplyChannel;
