use crate::envelope::RequestEnvelope;
use crate::error::BridgeError;
use crate::reply_channel::ReplyChannel;
use bytes::Bytes;
use courier_nats::Broker;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// The caller-supplied part of a request.
#[derive(Debug, Clone, Default)]
pub struct OutboundRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

/// Declares a reply channel and publishes the request envelope that points
/// at it.
#[derive(Clone)]
pub struct RequestPublisher<B> {
    broker: B,
}

impl<B: Broker> RequestPublisher<B> {
    pub fn new(broker: B) -> Self {
        Self { broker }
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Publish under a fresh random correlation id.
    pub async fn publish(
        &self,
        queue: &str,
        request: OutboundRequest,
    ) -> Result<ReplyChannel<B>, BridgeError> {
        self.publish_with_id(queue, Uuid::new_v4().to_string(), request)
            .await
    }

    /// On any failure the reply channel, if it was created, is deleted before
    /// the error is returned.
    pub async fn publish_with_id(
        &self,
        queue: &str,
        correlation_id: String,
        request: OutboundRequest,
    ) -> Result<ReplyChannel<B>, BridgeError> {
        let channel = ReplyChannel::declare(self.broker.clone(), correlation_id)
            .await
            .map_err(BridgeError::Declaration)?;

        let envelope = RequestEnvelope {
            correlation_id: channel.correlation_id().to_string(),
            reply_channel: channel.name().to_string(),
            method: request.method,
            path: request.path,
            headers: request.headers,
            body: request.body,
        };

        let payload = match serde_json::to_vec(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                channel.release().await;
                return Err(BridgeError::Serialize(e.to_string()));
            }
        };

        if let Err(e) = self.broker.publish(queue, Bytes::from(payload)).await {
            channel.release().await;
            return Err(BridgeError::Publish(e));
        }

        debug!(
            correlation_id = %envelope.correlation_id,
            queue,
            "published request, awaiting reply"
        );
        Ok(channel)
    }
}
