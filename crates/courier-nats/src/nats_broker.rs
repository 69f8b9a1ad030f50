//! [`Broker`] over NATS: JetStream streams for work queues, core NATS
//! subscriptions for reply channels.

use crate::broker::{Broker, BrokerError, Deliveries, Delivery};
use crate::channel::{Subjects, is_reply_channel, is_valid_channel_name};
use crate::trace::{extract_trace_context, headers_with_trace_context};
use async_nats::connection::State;
use async_nats::jetstream::consumer::pull;
use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy};
use async_nats::jetstream::stream::{Config as StreamConfig, RetentionPolicy, StorageType};
use async_nats::jetstream::{self, AckKind};
use async_nats::{Client, Subscriber};
use bytes::Bytes;
use futures::StreamExt;
use opentelemetry::Context;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Live reply subscriptions. A `None` slot means the subscriber is currently
/// lent out to a [`Broker::next_reply`] call.
type ReplyRegistry = Arc<Mutex<HashMap<String, Option<Subscriber>>>>;

/// How long JetStream waits for a settlement before redelivering.
pub const DEFAULT_ACK_WAIT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct NatsBroker {
    client: Client,
    jetstream: jetstream::Context,
    subjects: Subjects,
    replies: ReplyRegistry,
    declared_queues: Arc<Mutex<HashSet<String>>>,
    ack_wait: Duration,
}

impl NatsBroker {
    pub fn new(client: Client, prefix: impl Into<String>) -> Self {
        let jetstream = jetstream::new(client.clone());
        Self {
            client,
            jetstream,
            subjects: Subjects::new(prefix),
            replies: Arc::default(),
            declared_queues: Arc::default(),
            ack_wait: DEFAULT_ACK_WAIT,
        }
    }

    /// Redelivery window for consumers created by [`Broker::consume`]. Keep it
    /// longer than the slowest processor, or a message is handed out twice.
    pub fn with_ack_wait(mut self, ack_wait: Duration) -> Self {
        self.ack_wait = ack_wait;
        self
    }

    pub fn subjects(&self) -> &Subjects {
        &self.subjects
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn replies(&self) -> MutexGuard<'_, HashMap<String, Option<Subscriber>>> {
        self.replies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn ensure_stream(&self, queue: &str) -> Result<jetstream::stream::Stream, BrokerError> {
        if !is_valid_channel_name(queue) {
            return Err(BrokerError::Declaration {
                channel: queue.to_string(),
                reason: "invalid channel name".to_string(),
            });
        }

        let config = StreamConfig {
            name: self.subjects.work_stream(queue),
            subjects: vec![self.subjects.work(queue)],
            retention: RetentionPolicy::WorkQueue,
            storage: StorageType::File,
            ..Default::default()
        };

        let stream = self
            .jetstream
            .get_or_create_stream(config)
            .await
            .map_err(|e| BrokerError::Declaration {
                channel: queue.to_string(),
                reason: e.to_string(),
            })?;

        self.declared_queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(queue.to_string());
        Ok(stream)
    }

    fn is_declared(&self, queue: &str) -> bool {
        self.declared_queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(queue)
    }

    async fn publish_reply(&self, channel: &str, payload: Bytes) -> Result<(), BrokerError> {
        let publish_err = |reason: String| BrokerError::Publish {
            channel: channel.to_string(),
            reason,
        };

        self.client
            .publish_with_headers(
                self.subjects.reply(channel),
                headers_with_trace_context(),
                payload,
            )
            .await
            .map_err(|e| publish_err(e.to_string()))?;
        // Core publish only buffers; flushing surfaces a dead connection.
        self.client
            .flush()
            .await
            .map_err(|e| publish_err(e.to_string()))
    }

    async fn publish_work(&self, queue: &str, payload: Bytes) -> Result<(), BrokerError> {
        if !self.is_declared(queue) {
            self.ensure_stream(queue)
                .await
                .map_err(|e| BrokerError::Publish {
                    channel: queue.to_string(),
                    reason: e.to_string(),
                })?;
        }

        let publish_err = |reason: String| BrokerError::Publish {
            channel: queue.to_string(),
            reason,
        };

        let ack = self
            .jetstream
            .publish_with_headers(self.subjects.work(queue), headers_with_trace_context(), payload)
            .await
            .map_err(|e| publish_err(e.to_string()))?;
        ack.await.map_err(|e| publish_err(e.to_string()))?;
        Ok(())
    }
}

impl Broker for NatsBroker {
    type Delivery = NatsDelivery;

    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BrokerError> {
        if is_reply_channel(channel) {
            self.publish_reply(channel, payload).await
        } else {
            self.publish_work(channel, payload).await
        }
    }

    async fn declare_work_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.ensure_stream(queue).await.map(|_| ())
    }

    async fn declare_temporary(&self, name: &str) -> Result<(), BrokerError> {
        let declaration_err = |reason: &str| BrokerError::Declaration {
            channel: name.to_string(),
            reason: reason.to_string(),
        };

        if !is_valid_channel_name(name) {
            return Err(declaration_err("invalid channel name"));
        }
        if self.replies().contains_key(name) {
            return Err(declaration_err("channel already declared"));
        }

        let subscriber = self
            .client
            .subscribe(self.subjects.reply(name))
            .await
            .map_err(|e| declaration_err(&e.to_string()))?;

        let mut replies = self.replies();
        if replies.contains_key(name) {
            return Err(declaration_err("channel already declared"));
        }
        replies.insert(name.to_string(), Some(subscriber));
        debug!(channel = %name, "declared reply channel");
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), BrokerError> {
        let removed = self.replies().remove(name);
        match removed {
            Some(Some(mut subscriber)) => {
                subscriber
                    .unsubscribe()
                    .await
                    .map_err(|e| BrokerError::Delete {
                        channel: name.to_string(),
                        reason: e.to_string(),
                    })?;
                debug!(channel = %name, "deleted reply channel");
            }
            // Lent out: the lease drops the subscriber when it sees no slot.
            Some(None) => debug!(channel = %name, "deleted reply channel while in use"),
            None => {}
        }
        Ok(())
    }

    async fn next_reply(&self, name: &str) -> Result<Option<Bytes>, BrokerError> {
        let subscriber = {
            let mut replies = self.replies();
            match replies.get_mut(name) {
                None => return Ok(None),
                Some(slot) => slot.take().ok_or_else(|| BrokerError::Consume {
                    channel: name.to_string(),
                    reason: "reply channel already has a reader".to_string(),
                })?,
            }
        };

        let mut lease = ReplyLease {
            name: name.to_string(),
            registry: Arc::clone(&self.replies),
            subscriber: Some(subscriber),
        };
        Ok(lease.next().await)
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_name: &str,
    ) -> Result<Deliveries<NatsDelivery>, BrokerError> {
        let consume_err = |reason: String| BrokerError::Consume {
            channel: queue.to_string(),
            reason,
        };

        let stream = self.ensure_stream(queue).await?;
        let consumer: jetstream::consumer::Consumer<pull::Config> = stream
            .get_or_create_consumer(
                consumer_name,
                pull::Config {
                    durable_name: Some(consumer_name.to_string()),
                    ack_policy: AckPolicy::Explicit,
                    deliver_policy: DeliverPolicy::All,
                    filter_subject: self.subjects.work(queue),
                    ack_wait: self.ack_wait,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| consume_err(e.to_string()))?;

        // One message in flight per loop, so nothing sits in a prefetch buffer
        // while its ack timer runs.
        let messages = consumer
            .stream()
            .max_messages_per_batch(1)
            .messages()
            .await
            .map_err(|e| consume_err(e.to_string()))?;

        let queue = queue.to_string();
        Ok(messages
            .map(move |item| {
                item.map(|message| NatsDelivery { message })
                    .map_err(|e| BrokerError::Consume {
                        channel: queue.clone(),
                        reason: e.to_string(),
                    })
            })
            .boxed())
    }

    fn is_connected(&self) -> bool {
        matches!(self.client.connection_state(), State::Connected)
    }

    async fn close(&self) {
        let subscribers: Vec<(String, Subscriber)> = self
            .replies()
            .drain()
            .filter_map(|(name, slot)| slot.map(|s| (name, s)))
            .collect();

        for (name, mut subscriber) in subscribers {
            if let Err(e) = subscriber.unsubscribe().await {
                warn!(channel = %name, error = %e, "failed to release reply channel on close");
            }
        }

        match self.client.drain().await {
            Ok(()) => info!("NATS connection drained"),
            Err(e) => warn!(error = %e, "failed to drain NATS connection"),
        }
    }
}

/// Holds a reply subscriber for the duration of one receive. Dropping the
/// lease (including when the receive is cancelled) hands the subscriber back
/// to the registry, unless the channel was deleted meanwhile.
struct ReplyLease {
    name: String,
    registry: ReplyRegistry,
    subscriber: Option<Subscriber>,
}

impl ReplyLease {
    async fn next(&mut self) -> Option<Bytes> {
        let subscriber = self.subscriber.as_mut()?;
        subscriber.next().await.map(|message| message.payload)
    }
}

impl Drop for ReplyLease {
    fn drop(&mut self) {
        let Some(subscriber) = self.subscriber.take() else {
            return;
        };
        let mut replies = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = replies.get_mut(&self.name) {
            *slot = Some(subscriber);
        }
    }
}

/// A JetStream message pulled from a work queue.
pub struct NatsDelivery {
    message: jetstream::Message,
}

impl NatsDelivery {
    pub fn subject(&self) -> &str {
        self.message.subject.as_str()
    }
}

impl Delivery for NatsDelivery {
    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    fn trace_context(&self) -> Context {
        self.message
            .headers
            .as_ref()
            .map_or_else(Context::new, extract_trace_context)
    }

    async fn in_progress(&self) -> Result<(), BrokerError> {
        self.message
            .ack_with(AckKind::Progress)
            .await
            .map_err(|e| BrokerError::Ack {
                reason: e.to_string(),
            })
    }

    async fn ack(&self) -> Result<(), BrokerError> {
        self.message.ack().await.map_err(|e| BrokerError::Ack {
            reason: e.to_string(),
        })
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        let kind = if requeue {
            AckKind::Nak(None)
        } else {
            AckKind::Term
        };
        self.message
            .ack_with(kind)
            .await
            .map_err(|e| BrokerError::Ack {
                reason: e.to_string(),
            })
    }
}
