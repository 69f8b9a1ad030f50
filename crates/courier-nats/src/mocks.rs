//! In-process broker for tests.
//!
//! Queues are unbounded channels. Every operation is recorded so tests can
//! assert on channel lifecycles and delivery settlement, and failures can be
//! injected per operation.

use crate::broker::{Broker, BrokerError, Deliveries, Delivery};
use crate::channel::{is_reply_channel, is_valid_channel_name};
use bytes::Bytes;
use futures::StreamExt;
use opentelemetry::Context;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Ack { queue: String },
    Nack { queue: String, requeue: bool },
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>>;

struct Queue {
    temporary: bool,
    sender: mpsc::UnboundedSender<Bytes>,
    receiver: SharedReceiver,
}

impl Queue {
    fn new(temporary: bool) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            temporary,
            sender,
            receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
        }
    }
}

#[derive(Default)]
struct State {
    queues: HashMap<String, Queue>,
    temporaries_declared: usize,
    temporaries_deleted: usize,
    settlements: Vec<Settlement>,
    progress_marks: usize,
    fail_declarations: usize,
    fail_publishes: usize,
    fail_reply_publishes: bool,
    closed: bool,
}

#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<State>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn temporaries_declared(&self) -> usize {
        self.state().temporaries_declared
    }

    pub fn temporaries_deleted(&self) -> usize {
        self.state().temporaries_deleted
    }

    /// Reply channels declared but not yet deleted.
    pub fn live_temporaries(&self) -> usize {
        self.state().queues.values().filter(|q| q.temporary).count()
    }

    pub fn channel_exists(&self, name: &str) -> bool {
        self.state().queues.contains_key(name)
    }

    pub fn settlements(&self) -> Vec<Settlement> {
        self.state().settlements.clone()
    }

    /// How many times deliveries were marked in progress.
    pub fn progress_marks(&self) -> usize {
        self.state().progress_marks
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// The next `n` declarations (temporary or durable) fail.
    pub fn fail_next_declarations(&self, n: usize) {
        self.state().fail_declarations = n;
    }

    /// The next `n` publishes to work queues fail.
    pub fn fail_next_publishes(&self, n: usize) {
        self.state().fail_publishes = n;
    }

    /// Every publish to a reply channel fails while set.
    pub fn fail_reply_publishes(&self, fail: bool) {
        self.state().fail_reply_publishes = fail;
    }

    fn declare(&self, name: &str, temporary: bool) -> Result<(), BrokerError> {
        let mut state = self.state();
        let declaration_err = |reason: &str| BrokerError::Declaration {
            channel: name.to_string(),
            reason: reason.to_string(),
        };

        if state.closed {
            return Err(declaration_err("broker closed"));
        }
        if !is_valid_channel_name(name) {
            return Err(declaration_err("invalid channel name"));
        }
        if state.fail_declarations > 0 {
            state.fail_declarations -= 1;
            return Err(declaration_err("injected declaration failure"));
        }

        if let Some(existing) = state.queues.get(name) {
            return if temporary || existing.temporary {
                Err(declaration_err("channel already declared"))
            } else {
                Ok(())
            };
        }

        state.queues.insert(name.to_string(), Queue::new(temporary));
        if temporary {
            state.temporaries_declared += 1;
        }
        Ok(())
    }

    fn receiver(&self, name: &str) -> Option<SharedReceiver> {
        self.state()
            .queues
            .get(name)
            .map(|q| Arc::clone(&q.receiver))
    }

    fn settle(&self, settlement: Settlement) {
        self.state().settlements.push(settlement);
    }

    fn requeue(&self, queue: &str, payload: Bytes) {
        if let Some(q) = self.state().queues.get(queue) {
            let _ = q.sender.send(payload);
        }
    }
}

impl Broker for MemoryBroker {
    type Delivery = MemoryDelivery;

    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BrokerError> {
        let reply = is_reply_channel(channel);
        if !reply {
            let mut state = self.state();
            if state.fail_publishes > 0 {
                state.fail_publishes -= 1;
                return Err(BrokerError::Publish {
                    channel: channel.to_string(),
                    reason: "injected publish failure".to_string(),
                });
            }
            drop(state);
            self.declare(channel, false)
                .map_err(|e| BrokerError::Publish {
                    channel: channel.to_string(),
                    reason: e.to_string(),
                })?;
        }

        let state = self.state();
        if state.closed {
            return Err(BrokerError::Publish {
                channel: channel.to_string(),
                reason: "broker closed".to_string(),
            });
        }
        if reply && state.fail_reply_publishes {
            return Err(BrokerError::Publish {
                channel: channel.to_string(),
                reason: "injected reply publish failure".to_string(),
            });
        }
        if let Some(queue) = state.queues.get(channel) {
            let _ = queue.sender.send(payload);
        }
        Ok(())
    }

    async fn declare_work_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.declare(queue, false)
    }

    async fn declare_temporary(&self, name: &str) -> Result<(), BrokerError> {
        self.declare(name, true)
    }

    async fn delete(&self, name: &str) -> Result<(), BrokerError> {
        let mut state = self.state();
        if state.queues.remove(name).is_some_and(|q| q.temporary) {
            state.temporaries_deleted += 1;
        }
        Ok(())
    }

    async fn next_reply(&self, name: &str) -> Result<Option<Bytes>, BrokerError> {
        let Some(receiver) = self.receiver(name) else {
            return Ok(None);
        };
        let mut receiver = receiver.lock().await;
        Ok(receiver.recv().await)
    }

    async fn consume(
        &self,
        queue: &str,
        _consumer: &str,
    ) -> Result<Deliveries<MemoryDelivery>, BrokerError> {
        self.declare(queue, false)?;
        let receiver = self.receiver(queue).ok_or_else(|| BrokerError::Consume {
            channel: queue.to_string(),
            reason: "queue vanished".to_string(),
        })?;

        let broker = self.clone();
        let queue = queue.to_string();
        let deliveries = futures::stream::unfold(receiver, move |receiver| {
            let broker = broker.clone();
            let queue = queue.clone();
            async move {
                let payload = receiver.lock().await.recv().await?;
                let delivery = MemoryDelivery {
                    broker,
                    queue,
                    payload,
                };
                Some((Ok(delivery), receiver))
            }
        });
        Ok(deliveries.boxed())
    }

    fn is_connected(&self) -> bool {
        !self.state().closed
    }

    async fn close(&self) {
        let mut state = self.state();
        state.closed = true;
        state.queues.retain(|_, q| !q.temporary);
    }
}

pub struct MemoryDelivery {
    broker: MemoryBroker,
    queue: String,
    payload: Bytes,
}

impl Delivery for MemoryDelivery {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn trace_context(&self) -> Context {
        Context::new()
    }

    async fn in_progress(&self) -> Result<(), BrokerError> {
        self.broker.state().progress_marks += 1;
        Ok(())
    }

    async fn ack(&self) -> Result<(), BrokerError> {
        self.broker.settle(Settlement::Ack {
            queue: self.queue.clone(),
        });
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        self.broker.settle(Settlement::Nack {
            queue: self.queue.clone(),
            requeue,
        });
        if requeue {
            self.broker.requeue(&self.queue, self.payload.clone());
        }
        Ok(())
    }
}
