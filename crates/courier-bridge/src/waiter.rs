use crate::envelope::ResponseEnvelope;
use crate::error::BridgeError;
use crate::reply_channel::ReplyChannel;
use courier_nats::Broker;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Wait on `channel` until a response with the matching correlation id
/// arrives or `deadline` passes, then delete the channel.
///
/// Responses for other correlation ids are dropped; they do not extend the
/// deadline.
pub async fn wait_for_response<B: Broker>(
    channel: ReplyChannel<B>,
    deadline: Instant,
) -> Result<ResponseEnvelope, BridgeError> {
    let outcome = tokio::time::timeout_at(deadline, receive_matching(&channel)).await;
    let correlation_id = channel.correlation_id().to_string();
    channel.release().await;

    match outcome {
        Ok(result) => result,
        Err(_) => {
            warn!(correlation_id = %correlation_id, "timed out waiting for response");
            Err(BridgeError::Timeout { correlation_id })
        }
    }
}

async fn receive_matching<B: Broker>(
    channel: &ReplyChannel<B>,
) -> Result<ResponseEnvelope, BridgeError> {
    let closed = || BridgeError::ReplyChannelClosed {
        correlation_id: channel.correlation_id().to_string(),
    };

    loop {
        let payload = match channel.next().await {
            Ok(Some(payload)) => payload,
            Ok(None) => return Err(closed()),
            Err(e) => {
                warn!(reply_channel = %channel.name(), error = %e, "reply channel receive failed");
                return Err(closed());
            }
        };

        let envelope: ResponseEnvelope =
            serde_json::from_slice(&payload).map_err(|e| BridgeError::Decode {
                correlation_id: channel.correlation_id().to_string(),
                reason: e.to_string(),
            })?;

        if envelope.correlation_id != channel.correlation_id() {
            warn!(
                expected = %channel.correlation_id(),
                received = %envelope.correlation_id,
                "dropping response with foreign correlation id"
            );
            continue;
        }

        debug!(correlation_id = %envelope.correlation_id, status = envelope.status_code, "received response");
        return Ok(envelope);
    }
}
