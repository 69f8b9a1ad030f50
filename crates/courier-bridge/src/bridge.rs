use crate::config::MAX_TIMEOUT;
use crate::envelope::ResponseEnvelope;
use crate::error::BridgeError;
use crate::publisher::{OutboundRequest, RequestPublisher};
use crate::waiter::wait_for_response;
use courier_nats::Broker;
use std::time::Duration;
use tokio::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// One synchronous call over the broker: declare, publish, wait, clean up.
#[derive(Clone)]
pub struct Bridge<B> {
    publisher: RequestPublisher<B>,
    timeout: Duration,
}

impl<B: Broker> Bridge<B> {
    /// `timeout` is capped at [`MAX_TIMEOUT`].
    pub fn new(broker: B, timeout: Duration) -> Self {
        Self {
            publisher: RequestPublisher::new(broker),
            timeout: timeout.min(MAX_TIMEOUT),
        }
    }

    pub fn broker(&self) -> &B {
        self.publisher.broker()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The timeout covers the whole call, publish included.
    #[instrument(name = "bridge.call", skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn call(
        &self,
        queue: &str,
        request: OutboundRequest,
    ) -> Result<ResponseEnvelope, BridgeError> {
        let deadline = Instant::now() + self.timeout;
        self.call_until(queue, request, deadline).await
    }

    pub async fn call_until(
        &self,
        queue: &str,
        request: OutboundRequest,
        deadline: Instant,
    ) -> Result<ResponseEnvelope, BridgeError> {
        let correlation_id = Uuid::new_v4().to_string();
        let publish = self
            .publisher
            .publish_with_id(queue, correlation_id.clone(), request);

        // A publish cut short by the deadline drops its channel handle, which
        // deletes the channel.
        let channel = match tokio::time::timeout_at(deadline, publish).await {
            Ok(published) => published?,
            Err(_) => return Err(BridgeError::Timeout { correlation_id }),
        };
        wait_for_response(channel, deadline).await
    }
}
