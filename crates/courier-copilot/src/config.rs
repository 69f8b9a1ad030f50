//! Process configuration for the gateway and worker binaries.
//!
//! Tokens (`API_TOKEN`, `GITHUB_TOKEN`, `SMARTSHEET_TOKEN`) are not read here;
//! they go through [`courier_secrets::SecretStore`] so they can be stored
//! encrypted.

use crate::health;
use courier_bridge::BridgeConfig;
use courier_nats::NatsConfig;
use courier_secrets::DEFAULT_KEY_FILE;
use courier_std::env::ReadEnv;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8080;

fn health_interval<E: ReadEnv>(env: &E) -> Duration {
    env.secs_or("COURIER_HEALTH_INTERVAL_SECS", health::DEFAULT_INTERVAL)
}

fn key_file<E: ReadEnv>(env: &E) -> PathBuf {
    PathBuf::from(env.var_or("COURIER_KEY_FILE", DEFAULT_KEY_FILE))
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub nats: NatsConfig,
    pub bridge: BridgeConfig,
    pub port: u16,
    pub health_interval: Duration,
    pub key_file: PathBuf,
}

impl GatewayConfig {
    pub fn from_env<E: ReadEnv>(env: &E) -> Self {
        Self {
            nats: NatsConfig::from_env(env),
            bridge: BridgeConfig::from_env(env),
            port: env.parse_or("COURIER_PORT", DEFAULT_PORT),
            health_interval: health_interval(env),
            key_file: key_file(env),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub nats: NatsConfig,
    pub bridge: BridgeConfig,
    pub health_interval: Duration,
    pub key_file: PathBuf,
    pub github_api_url: String,
    pub smartsheet_api_url: String,
    /// `SMARTSHEET_SHEET_ID`; the worker refuses to start without it.
    pub sheet_id: Option<String>,
}

impl WorkerConfig {
    pub fn from_env<E: ReadEnv>(env: &E) -> Self {
        Self {
            nats: NatsConfig::from_env(env),
            bridge: BridgeConfig::from_env(env),
            health_interval: health_interval(env),
            key_file: key_file(env),
            github_api_url: env.var_or("GITHUB_API_URL", crate::github::DEFAULT_API_URL),
            smartsheet_api_url: env
                .var_or("SMARTSHEET_API_URL", crate::licenses::DEFAULT_API_URL),
            sheet_id: env
                .var("SMARTSHEET_SHEET_ID")
                .ok()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_std::env::InMemoryEnv;

    #[test]
    fn gateway_defaults() {
        let config = GatewayConfig::from_env(&InMemoryEnv::new());

        assert_eq!(config.port, 8080);
        assert_eq!(config.health_interval, Duration::from_secs(10));
        assert_eq!(config.key_file, PathBuf::from(".encryption_key"));
        assert_eq!(config.nats.servers, vec!["localhost:4222".to_string()]);
        assert_eq!(config.bridge, BridgeConfig::default());
    }

    #[test]
    fn gateway_reads_port_and_interval() {
        let env = InMemoryEnv::new()
            .with("COURIER_PORT", "9090")
            .with("COURIER_HEALTH_INTERVAL_SECS", "3")
            .with("COURIER_KEY_FILE", "/run/secrets/courier.key");

        let config = GatewayConfig::from_env(&env);

        assert_eq!(config.port, 9090);
        assert_eq!(config.health_interval, Duration::from_secs(3));
        assert_eq!(config.key_file, PathBuf::from("/run/secrets/courier.key"));
    }

    #[test]
    fn invalid_port_falls_back() {
        let env = InMemoryEnv::new().with("COURIER_PORT", "http");
        assert_eq!(GatewayConfig::from_env(&env).port, 8080);
    }

    #[test]
    fn worker_defaults() {
        let config = WorkerConfig::from_env(&InMemoryEnv::new());

        assert_eq!(config.github_api_url, "https://api.github.com");
        assert_eq!(config.smartsheet_api_url, "https://api.smartsheet.com/2.0");
        assert_eq!(config.sheet_id, None);
        assert_eq!(config.bridge.work_queue, "copilot-api");
    }

    #[test]
    fn worker_reads_upstreams() {
        let env = InMemoryEnv::new()
            .with("GITHUB_API_URL", "https://ghe.example.com/api/v3")
            .with("SMARTSHEET_SHEET_ID", " 123456 ")
            .with("NATS_URL", "nats://a:4222,nats://b:4222");

        let config = WorkerConfig::from_env(&env);

        assert_eq!(config.github_api_url, "https://ghe.example.com/api/v3");
        assert_eq!(config.sheet_id.as_deref(), Some("123456"));
        assert_eq!(config.nats.servers.len(), 2);
    }
}
