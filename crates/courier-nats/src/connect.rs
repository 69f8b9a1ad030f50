use crate::auth::{NatsAuth, NatsConfig};
use async_nats::{Client, ConnectOptions, Event};
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Failure to establish the initial broker connection. Fatal at startup.
#[derive(Debug)]
pub enum ConnectError {
    InvalidCredentials(std::io::Error),
    ConnectionFailed {
        servers: Vec<String>,
        error: async_nats::ConnectError,
    },
}

impl std::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCredentials(e) => write!(f, "failed to load NATS credentials: {e}"),
            Self::ConnectionFailed { servers, error } => {
                write!(f, "failed to connect to NATS servers {servers:?}: {error}")
            }
        }
    }
}

impl std::error::Error for ConnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidCredentials(e) => Some(e),
            Self::ConnectionFailed { error, .. } => Some(error),
        }
    }
}

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

fn reconnect_delay(attempts: usize) -> Duration {
    let exponent = u32::try_from(attempts).unwrap_or(u32::MAX);
    let delay = Duration::from_secs(
        2u64.saturating_pow(exponent)
            .min(MAX_RECONNECT_DELAY.as_secs()),
    );
    info!(attempts, delay_secs = delay.as_secs(), "NATS reconnect backoff");
    delay
}

async fn handle_event(event: Event) {
    match event {
        Event::Connected => info!("NATS connected"),
        Event::Disconnected => warn!("NATS disconnected, reconnecting"),
        Event::ServerError(err) => warn!(error = %err, "NATS server error"),
        Event::ClientError(err) => warn!(error = %err, "NATS client error"),
        Event::SlowConsumer(sid) => warn!(sid, "NATS slow consumer"),
        Event::LameDuckMode => warn!("NATS server entered lame duck mode"),
        Event::Closed => info!("NATS connection closed"),
        Event::Draining => info!("NATS connection draining"),
    }
}

async fn base_options(auth: &NatsAuth) -> Result<ConnectOptions, ConnectError> {
    let options = match auth {
        NatsAuth::Credentials(path) => ConnectOptions::with_credentials_file(path.clone())
            .await
            .map_err(|e| {
                warn!(error = %e, path = %path.display(), "unreadable NATS credentials file");
                ConnectError::InvalidCredentials(e)
            })?,
        NatsAuth::NKey(seed) => ConnectOptions::with_nkey(seed.clone()),
        NatsAuth::UserPassword { user, password } => {
            ConnectOptions::with_user_and_password(user.clone(), password.clone())
        }
        NatsAuth::Token(token) => ConnectOptions::with_token(token.clone()),
        NatsAuth::None => ConnectOptions::new(),
    };
    Ok(options)
}

/// Open the broker connection.
///
/// The initial attempt is bounded by `timeout` and is not retried: a broker
/// that is unreachable at startup is reported to the caller. Once connected,
/// the client reconnects on its own with exponential backoff capped at 30s.
#[instrument(name = "nats.connect", skip(config), fields(servers = ?config.servers, auth = %config.auth.description()))]
pub async fn connect(config: &NatsConfig, timeout: Duration) -> Result<Client, ConnectError> {
    let options = base_options(&config.auth)
        .await?
        .connection_timeout(timeout)
        .reconnect_delay_callback(reconnect_delay)
        .event_callback(|event| async move { handle_event(event).await });

    match options.connect(&config.servers).await {
        Ok(client) => {
            info!("connected to NATS");
            Ok(client)
        }
        Err(error) => {
            warn!(error = %error, "NATS connection failed");
            Err(ConnectError::ConnectionFailed {
                servers: config.servers.clone(),
                error,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_delay_doubles_from_one_second() {
        let delays: Vec<u64> = (0..5).map(|n| reconnect_delay(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn reconnect_delay_is_capped() {
        assert_eq!(reconnect_delay(5), MAX_RECONNECT_DELAY);
        assert_eq!(reconnect_delay(64), MAX_RECONNECT_DELAY);
        assert_eq!(reconnect_delay(usize::MAX), MAX_RECONNECT_DELAY);
    }

    #[tokio::test]
    async fn every_event_is_handled() {
        use async_nats::{ClientError, ServerError};

        for event in [
            Event::Connected,
            Event::Disconnected,
            Event::ServerError(ServerError::Other("boom".into())),
            Event::ClientError(ClientError::Other("boom".into())),
            Event::SlowConsumer(7),
            Event::LameDuckMode,
            Event::Closed,
            Event::Draining,
        ] {
            handle_event(event).await;
        }
    }

    #[tokio::test]
    async fn missing_credentials_file_is_reported() {
        let config = NatsConfig::new(
            vec!["localhost:4222".into()],
            NatsAuth::Credentials("/nonexistent/courier.creds".into()),
        );

        let err = connect(&config, Duration::from_millis(100)).await.unwrap_err();

        assert!(matches!(err, ConnectError::InvalidCredentials(_)));
        assert!(err.to_string().contains("credentials"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[tokio::test]
    async fn unreachable_server_fails_without_retrying() {
        let config = NatsConfig::from_url("nats://127.0.0.1:1");

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            connect(&config, Duration::from_millis(200)),
        )
        .await
        .expect("initial connect must not retry forever")
        .unwrap_err();

        assert!(matches!(err, ConnectError::ConnectionFailed { ref servers, .. } if servers == &["nats://127.0.0.1:1"]));
    }
}
