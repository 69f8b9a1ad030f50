use courier_nats::BrokerError;
use std::fmt;

/// Why a bridged call produced no response.
#[derive(Debug)]
pub enum BridgeError {
    Declaration(BrokerError),
    Publish(BrokerError),
    Serialize(String),
    Timeout { correlation_id: String },
    Decode { correlation_id: String, reason: String },
    ReplyChannelClosed { correlation_id: String },
}

impl BridgeError {
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Self::Timeout { correlation_id }
            | Self::Decode { correlation_id, .. }
            | Self::ReplyChannelClosed { correlation_id } => Some(correlation_id),
            _ => None,
        }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declaration(e) => write!(f, "reply channel declaration failed: {e}"),
            Self::Publish(e) => write!(f, "request publish failed: {e}"),
            Self::Serialize(e) => write!(f, "failed to encode request: {e}"),
            Self::Timeout { correlation_id } => {
                write!(f, "no response for request {correlation_id} before the deadline")
            }
            Self::Decode {
                correlation_id,
                reason,
            } => write!(f, "malformed response for request {correlation_id}: {reason}"),
            Self::ReplyChannelClosed { correlation_id } => {
                write!(f, "reply channel for request {correlation_id} closed")
            }
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Declaration(e) | Self::Publish(e) => Some(e),
            _ => None,
        }
    }
}
