//! HTTP gateway binary.
//!
//! Authenticates `/api/v1/*` calls with `API_TOKEN`, relays them onto the work
//! queue and waits for the worker's reply on a per-request channel.
//!
//! # Environment variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `NATS_URL` | `localhost:4222` | NATS server address(es) |
//! | `COURIER_PREFIX` | `courier` | Subject prefix |
//! | `COURIER_WORK_QUEUE` | `copilot-api` | Queue requests are relayed to |
//! | `COURIER_PORT` | `8080` | TCP port to listen on |
//! | `COURIER_REPLY_TIMEOUT_SECS` | `30` | Seconds to wait for a reply |
//! | `COURIER_HEALTH_INTERVAL_SECS` | `10` | Broker probe interval |
//! | `COURIER_KEY_FILE` | `.encryption_key` | Key for `ENC[...]` values |
//! | `API_TOKEN` | | Bearer token callers must present |
//! | `RUST_LOG` | `info` | Log filter |

use std::time::Duration;

use anyhow::{Context, Result};
use courier_bridge::{Bridge, GatewayState, router};
use courier_copilot::{GatewayConfig, HealthTicker, signal, telemetry};
use courier_nats::{Broker, NatsBroker, connect};
use courier_secrets::{Cipher, SecretStore, load_or_generate};
use courier_std::{SystemEnv, SystemFs};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let tracer_provider = telemetry::init_tracing("courier-gateway");

    let config = GatewayConfig::from_env(&SystemEnv);

    let key = load_or_generate(&SystemFs, &config.key_file)
        .with_context(|| format!("loading encryption key {}", config.key_file.display()))?;
    let secrets = SecretStore::new(SystemEnv, Cipher::new(key));
    let api_token = secrets
        .get_decrypted_value("API_TOKEN")
        .context("reading API_TOKEN")?;
    if api_token.is_none() {
        warn!("API_TOKEN is not set; /api/v1 requests will be refused");
    }

    info!(servers = ?config.nats.servers, "connecting to NATS");
    let client = connect(&config.nats, CONNECT_TIMEOUT)
        .await
        .context("connecting to NATS")?;
    let broker = NatsBroker::new(client, config.bridge.prefix.clone());
    broker
        .declare_work_queue(&config.bridge.work_queue)
        .await
        .context("declaring work queue")?;

    let cancel = CancellationToken::new();
    let shutdown = signal::cancel_on_shutdown(cancel.clone());
    let health = HealthTicker::new(config.health_interval).spawn(broker.clone(), cancel.clone());

    let state = GatewayState::new(
        Bridge::new(broker.clone(), config.bridge.reply_timeout),
        config.bridge.work_queue.clone(),
        api_token,
    );
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding port {}", config.port))?;

    info!(
        port = config.port,
        prefix = %config.bridge.prefix,
        queue = %config.bridge.work_queue,
        reply_timeout_secs = config.bridge.reply_timeout.as_secs(),
        "gateway listening"
    );

    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await;

    cancel.cancel();
    let _ = shutdown.await;
    if let Ok(report) = health.await {
        info!(probes = report.probes, failures = report.failures, "health ticker stopped");
    }
    broker.close().await;
    info!("gateway stopped");
    telemetry::shutdown_tracing(&tracer_provider);

    served.context("serving HTTP")
}
