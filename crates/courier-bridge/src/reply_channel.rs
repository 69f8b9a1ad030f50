use bytes::Bytes;
use courier_nats::{Broker, BrokerError, reply_channel_name};
use tracing::{debug, warn};

/// A declared reply channel, owned by exactly one in-flight call.
///
/// Call [`release`](Self::release) to delete it. If the handle is dropped
/// without being released (the owning future was cancelled), the delete is
/// spawned onto the current runtime instead.
pub struct ReplyChannel<B: Broker> {
    broker: B,
    name: String,
    correlation_id: String,
    released: bool,
}

impl<B: Broker> ReplyChannel<B> {
    pub async fn declare(broker: B, correlation_id: impl Into<String>) -> Result<Self, BrokerError> {
        let correlation_id = correlation_id.into();
        let name = reply_channel_name(&correlation_id);
        broker.declare_temporary(&name).await?;
        Ok(Self {
            broker,
            name,
            correlation_id,
            released: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Next raw message, or `None` if the channel has gone away.
    pub async fn next(&self) -> Result<Option<Bytes>, BrokerError> {
        self.broker.next_reply(&self.name).await
    }

    pub async fn release(mut self) {
        if let Err(e) = self.broker.delete(&self.name).await {
            warn!(reply_channel = %self.name, error = %e, "failed to delete reply channel");
        }
        self.released = true;
    }
}

impl<B: Broker> Drop for ReplyChannel<B> {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let broker = self.broker.clone();
        let name = std::mem::take(&mut self.name);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(reply_channel = %name, "releasing abandoned reply channel");
                runtime.spawn(async move {
                    if let Err(e) = broker.delete(&name).await {
                        warn!(reply_channel = %name, error = %e, "failed to delete abandoned reply channel");
                    }
                });
            }
            Err(_) => warn!(reply_channel = %name, "no runtime left to delete reply channel"),
        }
    }
}
