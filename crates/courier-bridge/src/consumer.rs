//! Worker side: pull requests from a work queue, run the processor, publish
//! the response, then settle the delivery.

use crate::config::MAX_TIMEOUT;
use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::processor::{ProcessContext, Processor, ProcessorRegistry};
use bytes::Bytes;
use courier_nats::{Broker, BrokerError, Delivery, is_reply_channel};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use tracing_opentelemetry::OpenTelemetrySpanExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Declaring,
    Consuming,
    Stopped,
}

/// How a single delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Acked,
    Rejected,
}

/// Consumes one work queue with one processor.
pub struct ConsumerLoop<B: Broker> {
    broker: B,
    queue: String,
    consumer_name: String,
    processor: Arc<dyn Processor>,
    processor_timeout: Duration,
    state: watch::Sender<ConsumerState>,
}

impl<B: Broker> ConsumerLoop<B> {
    pub fn new(
        broker: B,
        queue: impl Into<String>,
        consumer_name: impl Into<String>,
        processor: Arc<dyn Processor>,
        processor_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(ConsumerState::Idle);
        Self {
            broker,
            queue: queue.into(),
            consumer_name: consumer_name.into(),
            processor,
            processor_timeout: processor_timeout.min(MAX_TIMEOUT),
            state,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ConsumerState) {
        self.state.send_replace(state);
        debug!(queue = %self.queue, ?state, "consumer state changed");
    }

    /// Run until `cancel` fires or the delivery stream ends.
    ///
    /// Only failing to declare or attach to the queue is an error; problems
    /// with individual messages are settled and logged.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), BrokerError> {
        self.set_state(ConsumerState::Declaring);

        let attach = async {
            self.broker.declare_work_queue(&self.queue).await?;
            self.broker.consume(&self.queue, &self.consumer_name).await
        };
        let mut deliveries = tokio::select! {
            _ = cancel.cancelled() => {
                self.set_state(ConsumerState::Stopped);
                return Ok(());
            }
            attached = attach => match attached {
                Ok(deliveries) => deliveries,
                Err(e) => {
                    error!(queue = %self.queue, error = %e, "failed to start consuming");
                    self.set_state(ConsumerState::Stopped);
                    return Err(e);
                }
            },
        };

        self.set_state(ConsumerState::Consuming);
        info!(queue = %self.queue, consumer = %self.consumer_name, "consuming");

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = deliveries.next() => next,
            };

            match next {
                Some(Ok(delivery)) => {
                    self.handle(&delivery, &cancel).await;
                }
                Some(Err(e)) => warn!(queue = %self.queue, error = %e, "delivery stream error"),
                None => {
                    warn!(queue = %self.queue, "delivery stream ended");
                    break;
                }
            }
        }

        self.set_state(ConsumerState::Stopped);
        info!(queue = %self.queue, "consumer stopped");
        Ok(())
    }

    async fn handle(&self, delivery: &B::Delivery, cancel: &CancellationToken) -> Settled {
        let request: RequestEnvelope = match serde_json::from_slice(delivery.payload()) {
            Ok(request) => request,
            Err(e) => {
                warn!(queue = %self.queue, error = %e, "undecodable request, rejecting");
                return reject(delivery).await;
            }
        };

        if !is_reply_channel(&request.reply_channel) {
            warn!(
                queue = %self.queue,
                correlation_id = %request.correlation_id,
                reply_channel = %request.reply_channel,
                "request names an invalid reply channel, rejecting"
            );
            return reject(delivery).await;
        }

        let span = info_span!(
            "consumer.handle",
            queue = %self.queue,
            correlation_id = %request.correlation_id,
            method = %request.method,
            path = %request.path,
        );
        span.set_parent(delivery.trace_context());
        async {
            if let Err(e) = delivery.in_progress().await {
                warn!(error = %e, "failed to mark delivery in progress");
            }
            let response = self.invoke(&request, cancel).await;
            let payload = match serde_json::to_vec(&response) {
                Ok(payload) => Bytes::from(payload),
                Err(e) => {
                    error!(error = %e, "failed to encode response, rejecting");
                    return reject(delivery).await;
                }
            };

            if let Err(e) = self.broker.publish(&request.reply_channel, payload).await {
                error!(error = %e, "failed to publish response, rejecting");
                return reject(delivery).await;
            }

            if let Err(e) = delivery.ack().await {
                warn!(error = %e, "failed to ack delivery");
            }
            debug!(status = response.status_code, "request handled");
            Settled::Acked
        }
        .instrument(span)
        .await
    }

    async fn invoke(&self, request: &RequestEnvelope, cancel: &CancellationToken) -> ResponseEnvelope {
        let ctx = ProcessContext {
            correlation_id: request.correlation_id.clone(),
            method: request.method.clone(),
            path: request.path.clone(),
            headers: request.headers.clone(),
            deadline: Instant::now() + self.processor_timeout,
            cancel: cancel.child_token(),
        };

        let outcome = tokio::time::timeout(
            self.processor_timeout,
            self.processor.process(&ctx, request.body.clone()),
        )
        .await;

        match outcome {
            Ok(Ok(response)) => ResponseEnvelope {
                correlation_id: request.correlation_id.clone(),
                status_code: response.status,
                headers: response.headers,
                body: response.body,
            },
            Ok(Err(e)) => {
                warn!(error = %e, "processor failed");
                ResponseEnvelope::internal_error(&request.correlation_id, e.message())
            }
            Err(_) => {
                ctx.cancel.cancel();
                warn!(timeout_secs = self.processor_timeout.as_secs(), "processor timed out");
                ResponseEnvelope::internal_error(&request.correlation_id, "processor timed out")
            }
        }
    }
}

async fn reject<D: Delivery>(delivery: &D) -> Settled {
    if let Err(e) = delivery.nack(false).await {
        warn!(error = %e, "failed to reject delivery");
    }
    Settled::Rejected
}

/// Starts one consumer task per registered queue.
pub struct WorkerPool<B: Broker> {
    broker: B,
    registry: ProcessorRegistry,
    consumer_name: String,
    processor_timeout: Duration,
}

impl<B: Broker> WorkerPool<B> {
    pub fn new(
        broker: B,
        registry: ProcessorRegistry,
        consumer_name: impl Into<String>,
        processor_timeout: Duration,
    ) -> Self {
        Self {
            broker,
            registry,
            consumer_name: consumer_name.into(),
            processor_timeout,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> RunningPool {
        let mut tasks = Vec::with_capacity(self.registry.len());
        let mut states = HashMap::with_capacity(self.registry.len());

        for queue in self.registry.queues() {
            let Some(processor) = self.registry.get(queue) else {
                continue;
            };
            let consumer = ConsumerLoop::new(
                self.broker.clone(),
                queue,
                self.consumer_name.clone(),
                processor,
                self.processor_timeout,
            );
            states.insert(queue.to_string(), consumer.state());
            let handle = tokio::spawn(consumer.run(cancel.clone()));
            tasks.push((queue.to_string(), handle));
        }

        RunningPool { tasks, states }
    }
}

pub struct RunningPool {
    tasks: Vec<(String, JoinHandle<Result<(), BrokerError>>)>,
    states: HashMap<String, watch::Receiver<ConsumerState>>,
}

impl RunningPool {
    pub fn state(&self, queue: &str) -> Option<watch::Receiver<ConsumerState>> {
        self.states.get(queue).cloned()
    }

    /// Wait for every consumer task. Returns the first consumer that failed
    /// to start, if any.
    pub async fn join(self) -> Result<(), BrokerError> {
        let mut first_error = None;
        for (queue, handle) in self.tasks {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(queue = %queue, error = %e, "consumer exited with error");
                    first_error.get_or_insert(e);
                }
                Err(e) => error!(queue = %queue, error = %e, "consumer task panicked"),
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
